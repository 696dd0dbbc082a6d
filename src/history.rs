/// Record of the moves performed by the last run, kept for undo.
///
/// The log is stored as pretty-printed JSON at the organizer root and only
/// rewritten by runs that actually moved something, so re-running on an
/// organized tree keeps the previous history intact.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// History file name, stored directly under the organizer root.
pub const HISTORY_FILE_NAME: &str = ".screensort_history.json";

/// Errors from reading, writing or replaying the history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid base path {}: {source}", path.display())]
    InvalidBasePath { path: PathBuf, source: io::Error },
    #[error("Failed to write history file: {source}")]
    Write { source: io::Error },
    #[error("Failed to read history file: {source}")]
    Read { source: io::Error },
    #[error("Invalid history file format: {reason}")]
    InvalidFormat { reason: String },
    #[error("No previous organization found to undo")]
    NoHistory,
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// One executed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub original_path: PathBuf,
    pub new_path: PathBuf,
}

/// All moves performed by one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLog {
    /// RFC 3339 timestamp of the run.
    pub timestamp: String,
    pub base_path: PathBuf,
    pub operations: Vec<MoveRecord>,
}

impl OperationLog {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            base_path,
            operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, operation: MoveRecord) {
        self.operations.push(operation);
    }

    pub fn history_file_path(base_path: &Path) -> PathBuf {
        base_path.join(HISTORY_FILE_NAME)
    }

    pub fn save(&self, base_path: &Path) -> HistoryResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| HistoryError::Write {
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        fs::write(Self::history_file_path(base_path), json)
            .map_err(|source| HistoryError::Write { source })
    }

    /// Loads the most recent log, or `None` when there is no history file.
    pub fn load(base_path: &Path) -> HistoryResult<Option<Self>> {
        let history_path = Self::history_file_path(base_path);
        if !history_path.exists() {
            return Ok(None);
        }

        let json =
            fs::read_to_string(&history_path).map_err(|source| HistoryError::Read { source })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| HistoryError::InvalidFormat {
                reason: format!("JSON parse error: {}", e),
            })
    }

    pub fn delete(base_path: &Path) -> HistoryResult<()> {
        let history_path = Self::history_file_path(base_path);
        if history_path.exists() {
            fs::remove_file(&history_path).map_err(|source| HistoryError::Write { source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();

        let mut log = OperationLog::new(base_path.to_path_buf());
        log.add_operation(MoveRecord {
            original_path: base_path.join("Screenshot 2022-03-14.png"),
            new_path: base_path.join("_2022/03 March/Screenshot 2022-03-14.png"),
        });
        log.save(base_path).expect("Failed to save history");

        let loaded = OperationLog::load(base_path)
            .expect("Failed to load history")
            .expect("history should exist");
        assert_eq!(loaded.operations, log.operations);
        assert_eq!(loaded.timestamp, log.timestamp);
        assert!(chrono::DateTime::parse_from_rfc3339(&loaded.timestamp).is_ok());
    }

    #[test]
    fn test_load_missing_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(OperationLog::load(temp_dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(OperationLog::history_file_path(temp_dir.path()), "{ not json").unwrap();

        let result = OperationLog::load(temp_dir.path());
        assert!(matches!(result, Err(HistoryError::InvalidFormat { .. })));
    }

    #[test]
    fn test_delete_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        OperationLog::new(base_path.to_path_buf())
            .save(base_path)
            .unwrap();
        assert!(OperationLog::history_file_path(base_path).exists());

        OperationLog::delete(base_path).unwrap();
        assert!(!OperationLog::history_file_path(base_path).exists());
        OperationLog::delete(base_path).unwrap();
    }
}
