/// Reverting the most recent organizing run.
///
/// Files are moved back to where they were found, using the history written
/// by the run. Directories emptied by the restore are pruned, up to but never
/// including the organizer root.
use crate::history::{HistoryError, HistoryResult, MoveRecord, OperationLog};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Represents the result of an undo operation.
#[derive(Debug)]
pub struct UndoReport {
    pub restored_files: usize,
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Files no longer found at their organized location.
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    fn new() -> Self {
        Self {
            restored_files: 0,
            failed_restores: Vec::new(),
            skipped_files: Vec::new(),
        }
    }

    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

enum RestoreError {
    Missing(PathBuf),
    Failed(PathBuf, String),
}

pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent organizing run under `base_path`.
    ///
    /// # Edge Cases Handled
    ///
    /// * **File not found**: Skipped with a note that the file couldn't be found
    /// * **File name conflict**: The conflicting file is backed up with a timestamp suffix
    /// * **Path outside the root**: Recorded as a failure, nothing is touched
    /// * **Missing history**: Returns [`HistoryError::NoHistory`]
    ///
    /// The history file is deleted only when every file was restored.
    pub fn undo(base_path: &Path) -> HistoryResult<UndoReport> {
        if !base_path.is_dir() {
            return Err(HistoryError::InvalidBasePath {
                path: base_path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "base path does not exist",
                ),
            });
        }

        let log = OperationLog::load(base_path)?.ok_or(HistoryError::NoHistory)?;

        let mut report = UndoReport::new();
        for operation in log.operations.iter().rev() {
            match Self::restore_file(base_path, operation) {
                Ok(()) => {
                    report.restored_files += 1;
                    if let Some(parent) = operation.new_path.parent() {
                        Self::prune_empty_dirs(base_path, parent);
                    }
                }
                Err(RestoreError::Missing(path)) => report
                    .skipped_files
                    .push((path, "File not found at expected location".to_string())),
                Err(RestoreError::Failed(path, reason)) => {
                    report.failed_restores.push((path, reason))
                }
            }
        }

        if report.is_complete_success()
            && let Err(e) = OperationLog::delete(base_path)
        {
            warn!("Could not delete history file: {}", e);
        }

        Ok(report)
    }

    fn restore_file(base_path: &Path, operation: &MoveRecord) -> Result<(), RestoreError> {
        for path in [&operation.original_path, &operation.new_path] {
            if !path.starts_with(base_path) {
                return Err(RestoreError::Failed(
                    path.clone(),
                    format!("path is outside of {}", base_path.display()),
                ));
            }
        }

        if !operation.new_path.exists() {
            return Err(RestoreError::Missing(operation.new_path.clone()));
        }

        if operation.original_path.exists() {
            let backup_path = Self::generate_backup_path(&operation.original_path);
            fs::rename(&operation.original_path, &backup_path).map_err(|e| {
                RestoreError::Failed(
                    operation.original_path.clone(),
                    format!("Could not backup conflicting file: {}", e),
                )
            })?;
        }

        if let Some(parent) = operation.original_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RestoreError::Failed(
                    parent.to_path_buf(),
                    format!("Could not recreate directory: {}", e),
                )
            })?;
        }

        fs::rename(&operation.new_path, &operation.original_path).map_err(|e| {
            RestoreError::Failed(
                operation.new_path.clone(),
                format!("Failed to restore file: {}", e),
            )
        })
    }

    /// Removes `dir` and its ancestors while they are empty, stopping at the root.
    fn prune_empty_dirs(base_path: &Path, dir: &Path) {
        for ancestor in dir.ancestors() {
            if ancestor == base_path || !ancestor.starts_with(base_path) {
                break;
            }
            if fs::remove_dir(ancestor).is_err() {
                break;
            }
            debug!("Removed emptied directory {}", ancestor.display());
        }
    }

    /// Example: `file.png` becomes `file.png.bak.20251109-143052`
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");

        let backup_name = format!("{}.bak.{}", filename, timestamp);

        match original_path.parent() {
            Some(parent) => parent.join(backup_name),
            None => PathBuf::from(backup_name),
        }
    }
}
