//! Recursive snapshot of the organizer root.
//!
//! The scanner walks the tree once without following symbolic links and
//! returns one [`FileRecord`] per file or directory below the root. Metadata
//! is read in parallel; the result is sorted by path so everything downstream
//! sees the same order for the same tree.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Errors that end a scan before any planning happens.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root does not exist, is not a directory, or cannot be read.
    #[error("cannot read directory {}: {source}", path.display())]
    Root { path: PathBuf, source: io::Error },
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

/// The directory everything is confined to. Stored canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root(PathBuf);

impl Root {
    /// Validates and canonicalizes a user-supplied directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let canonical = fs::canonicalize(path).map_err(|source| ScanError::Root {
            path: path.to_path_buf(),
            source,
        })?;
        if !canonical.is_dir() {
            return Err(ScanError::NotADirectory { path: canonical });
        }
        Ok(Self(canonical))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for Root {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// One filesystem entry found below the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub parent: PathBuf,
    pub name: String,
    pub is_dir: bool,
    /// A symbolic link, or an entry whose metadata could not be read.
    /// Never moved, and the directory holding it is never emptied.
    pub opaque: bool,
    /// Birth time, when the platform reports one.
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl FileRecord {
    fn from_entry(entry: &DirEntry) -> io::Result<Self> {
        let metadata = entry.metadata().map_err(io::Error::from)?;
        let path = entry.path().to_path_buf();
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            parent,
            is_dir: metadata.is_dir(),
            opaque: entry.path_is_symlink(),
            created: metadata.created().ok(),
            modified: metadata.modified().ok(),
            path,
        })
    }

    fn opaque(path: &Path) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            parent: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path: path.to_path_buf(),
            is_dir: false,
            opaque: true,
            created: None,
            modified: None,
        }
    }
}

/// Walks `root` and returns every entry below it.
///
/// Symbolic links are reported as opaque records and never followed. Entries
/// that cannot be stat'ed mid-walk are logged and reported as opaque too, so
/// the planner knows their directory is not empty. Only an unreadable root is
/// fatal.
pub fn scan(root: &Root) -> Result<Vec<FileRecord>, ScanError> {
    fs::read_dir(root.path()).map_err(|source| ScanError::Root {
        path: root.path().to_path_buf(),
        source,
    })?;

    let mut unreadable: Vec<PathBuf> = Vec::new();
    let entries: Vec<DirEntry> = WalkDir::new(root.path())
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                if let Some(path) = err.path().filter(|path| *path != root.path()) {
                    unreadable.push(path.to_path_buf());
                }
                None
            }
        })
        .collect();

    let mut records: Vec<FileRecord> = entries
        .par_iter()
        .map(|entry| match FileRecord::from_entry(entry) {
            Ok(record) => {
                if record.opaque {
                    debug!("Not following symbolic link {}", record.path.display());
                }
                record
            }
            Err(err) => {
                warn!("Skipping {}: {}", entry.path().display(), err);
                FileRecord::opaque(entry.path())
            }
        })
        .collect();

    for path in unreadable {
        if !records.iter().any(|record| record.path == path) {
            records.push(FileRecord::opaque(&path));
        }
    }

    records.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Scanned {} entries under {}", records.len(), root.path().display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_root_rejects_missing_directory() {
        let result = Root::new("/non/existent/path");
        assert!(matches!(result, Err(ScanError::Root { .. })));
    }

    #[test]
    fn test_root_rejects_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "x").expect("Failed to write file");

        let result = Root::new(&file);
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_scan_is_recursive_and_sorted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = Root::new(temp_dir.path()).expect("valid root");

        fs::create_dir_all(root.path().join("b/nested")).unwrap();
        fs::write(root.path().join("a.png"), "a").unwrap();
        fs::write(root.path().join("b/nested/c.png"), "c").unwrap();

        let records = scan(&root).expect("scan succeeds");
        let relative: Vec<_> = records
            .iter()
            .map(|r| r.path.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.png"),
                PathBuf::from("b"),
                PathBuf::from("b/nested"),
                PathBuf::from("b/nested/c.png"),
            ]
        );

        let nested = &records[3];
        assert_eq!(nested.name, "c.png");
        assert_eq!(nested.parent, root.path().join("b/nested"));
        assert!(!nested.is_dir);
        assert!(nested.modified.is_some());
        assert!(records[1].is_dir);
    }

    #[test]
    fn test_scan_empty_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = Root::new(temp_dir.path()).expect("valid root");
        assert!(scan(&root).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_reports_symlinks_as_opaque() {
        let outside = TempDir::new().expect("Failed to create temp directory");
        fs::write(outside.path().join("Screenshot 2022-01-01.png"), "x").unwrap();

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = Root::new(temp_dir.path()).expect("valid root");
        std::os::unix::fs::symlink(outside.path(), root.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("Screenshot 2022-01-01.png"),
            root.path().join("Screenshot 2022-01-01.png"),
        )
        .unwrap();

        let records = scan(&root).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Screenshot 2022-01-01.png", "linked_dir"]);
        assert!(records.iter().all(|r| r.opaque && !r.is_dir));
    }

    #[test]
    fn test_regular_entries_are_not_opaque() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = Root::new(temp_dir.path()).expect("valid root");
        fs::create_dir(root.path().join("inbox")).unwrap();
        fs::write(root.path().join("inbox/a.png"), "a").unwrap();

        let records = scan(&root).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.opaque));
    }
}
