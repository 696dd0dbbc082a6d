//! Plan execution, the only part of the crate that changes the filesystem.
//!
//! The executor walks a [`Plan`] in order and stops after a fixed number of
//! operations. Per-file failures are reported and skipped; an operation that
//! would leave the root or remove a non-empty directory means the plan itself
//! is wrong and stops the run.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::MoveRecord;
use crate::layout::DestinationPath;
use crate::plan::{Operation, Plan};

/// Operations executed per run unless configured otherwise.
pub const DEFAULT_MAX_OPERATIONS: usize = 5000;

/// Invariant violations found while executing a plan.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("refusing to touch {} outside of {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("directory {} is not empty", path.display())]
    DirectoryNotEmpty { path: PathBuf },
}

/// What happened to a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Moved,
    Removed,
    Skipped(String),
}

/// Aggregate result of one execution.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub moved: usize,
    pub removed_dirs: usize,
    /// Operations that failed without stopping the run, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
    /// Planned operations left for a later run by the operation limit.
    pub remaining: usize,
    /// Every move performed, in order.
    pub moves: Vec<MoveRecord>,
}

/// Applies plans under a fixed root with an upper bound on work per run.
#[derive(Debug, Clone)]
pub struct Executor<'a> {
    root: &'a Path,
    /// `root` with symlinks resolved, for checks against resolved paths.
    resolved_root: PathBuf,
    max_operations: usize,
}

impl<'a> Executor<'a> {
    pub fn new(root: &'a Path, max_operations: usize) -> Self {
        Self {
            root,
            resolved_root: fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
            max_operations,
        }
    }

    pub fn execute(&self, plan: &Plan) -> Result<ExecutionReport, ExecuteError> {
        self.execute_with(plan, |_, _| {})
    }

    /// Executes at most `max_operations` operations of `plan`, in order,
    /// calling `on_step` after each one.
    pub fn execute_with<F>(
        &self,
        plan: &Plan,
        mut on_step: F,
    ) -> Result<ExecutionReport, ExecuteError>
    where
        F: FnMut(&Operation, &StepOutcome),
    {
        let mut report = ExecutionReport::default();
        let mut unmoved: Vec<&Path> = Vec::new();

        let budget = plan.len().min(self.max_operations);
        for operation in &plan.operations()[..budget] {
            let outcome = match operation {
                Operation::Move {
                    source,
                    destination,
                    ..
                } => {
                    let outcome = self.move_file(source, destination)?;
                    match outcome {
                        StepOutcome::Moved => {
                            report.moved += 1;
                            report.moves.push(MoveRecord {
                                original_path: source.clone(),
                                new_path: destination.as_path().to_path_buf(),
                            });
                        }
                        _ => unmoved.push(source),
                    }
                    outcome
                }
                Operation::RemoveEmptyDirectory { path } => {
                    let outcome = self.remove_directory(path, &unmoved)?;
                    if outcome == StepOutcome::Removed {
                        report.removed_dirs += 1;
                    }
                    outcome
                }
            };

            if let StepOutcome::Skipped(reason) = &outcome {
                warn!("Skipped {}: {}", operation.key().display(), reason);
                report.skipped.push((operation.key().to_path_buf(), reason.clone()));
            }
            on_step(operation, &outcome);
        }

        report.remaining = plan.len() - budget;
        if report.remaining > 0 {
            info!(
                "Operation limit of {} reached, {} operations left for the next run",
                self.max_operations, report.remaining
            );
        }
        Ok(report)
    }

    fn ensure_contained(&self, path: &Path) -> Result<(), ExecuteError> {
        let escapes = path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
        if escapes || !path.starts_with(self.root) || path == self.root {
            return Err(ExecuteError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Follows symlinks through the part of `directory` that already exists
    /// and requires the result to stay under the root.
    fn ensure_resolves_inside(&self, directory: &Path) -> Result<(), ExecuteError> {
        let Some(existing) = directory.ancestors().find(|ancestor| ancestor.exists()) else {
            return Ok(());
        };
        match fs::canonicalize(existing) {
            Ok(resolved) if !resolved.starts_with(&self.resolved_root) => {
                Err(ExecuteError::OutsideRoot {
                    path: resolved,
                    root: self.root.to_path_buf(),
                })
            }
            _ => Ok(()),
        }
    }

    fn move_file(
        &self,
        source: &Path,
        destination: &DestinationPath,
    ) -> Result<StepOutcome, ExecuteError> {
        self.ensure_contained(source)?;
        self.ensure_contained(destination.as_path())?;

        if fs::symlink_metadata(destination).is_ok() {
            return Ok(StepOutcome::Skipped("target already exists".to_string()));
        }

        let directory = destination.directory();
        self.ensure_resolves_inside(directory)?;
        if let Err(e) = fs::create_dir_all(directory) {
            return Ok(StepOutcome::Skipped(format!(
                "could not create {}: {}",
                directory.display(),
                e
            )));
        }

        match relocate(source, destination.as_path()) {
            Ok(()) => {
                debug!("Moved {} -> {}", source.display(), destination);
                Ok(StepOutcome::Moved)
            }
            Err(e) => Ok(StepOutcome::Skipped(format!("failed to move: {}", e))),
        }
    }

    fn remove_directory(
        &self,
        path: &Path,
        unmoved: &[&Path],
    ) -> Result<StepOutcome, ExecuteError> {
        self.ensure_contained(path)?;

        if unmoved.iter().any(|source| source.starts_with(path)) {
            return Ok(StepOutcome::Skipped(
                "still holds files that were not moved".to_string(),
            ));
        }

        match fs::remove_dir(path) {
            Ok(()) => {
                debug!("Removed empty directory {}", path.display());
                Ok(StepOutcome::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                Err(ExecuteError::DirectoryNotEmpty {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Ok(StepOutcome::Skipped(format!("failed to remove: {}", e))),
        }
    }
}

/// Renames `source` to `destination`, copying across filesystems when needed.
fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("{} is on another device, copying", source.display());
            if let Err(copy_err) = fs::copy(source, destination) {
                let _ = fs::remove_file(destination);
                return Err(copy_err);
            }
            fs::remove_file(source)
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::date::{DateResolver, DateSource};
    use crate::layout::ArchiveRule;
    use crate::plan::Planner;
    use crate::scan::{Root, scan};
    use tempfile::TempDir;

    fn planner() -> Planner {
        Planner::new(
            Classifier::default(),
            DateResolver::new(DateSource::Filename),
            ArchiveRule::DEFAULT,
        )
    }

    fn setup(files: &[&str]) -> (TempDir, Root) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = Root::new(temp_dir.path()).expect("valid root");
        for file in files {
            let path = root.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.as_bytes()).expect("Failed to write test file");
        }
        (temp_dir, root)
    }

    fn plan_for(root: &Root) -> Plan {
        let records = scan(root).unwrap();
        planner().plan(root.path(), &records).unwrap()
    }

    #[test]
    fn test_execute_moves_and_creates_directories() {
        let name = "Screenshot 2022-03-14 at 10.00.00 AM.png";
        let (_tmp, root) = setup(&[name]);

        let plan = plan_for(&root);
        let report = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS)
            .execute(&plan)
            .unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(report.remaining, 0);
        assert!(report.skipped.is_empty());
        let moved = root.path().join("_2022/03 March").join(name);
        assert!(moved.is_file());
        assert!(!root.path().join(name).exists());
        assert_eq!(report.moves[0].new_path, moved);
    }

    #[test]
    fn test_second_plan_after_execution_is_empty() {
        let (_tmp, root) = setup(&[
            "Screenshot 2022-03-14 at 10.00.00 AM.png",
            "inbox/Screenshot 2025-06-01 at 09.00.00 AM.png",
        ]);

        let report = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS)
            .execute(&plan_for(&root))
            .unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.removed_dirs, 1);
        assert!(!root.path().join("inbox").exists());

        assert!(plan_for(&root).is_empty());
    }

    #[test]
    fn test_execution_is_bounded() {
        let names: Vec<String> = (1..=9)
            .map(|day| format!("Screenshot 2024-01-0{day} at 1.png"))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (_tmp, root) = setup(&refs);

        let plan = plan_for(&root);
        assert_eq!(plan.len(), 9);

        let report = Executor::new(root.path(), 4).execute(&plan).unwrap();
        assert_eq!(report.moved, 4);
        assert_eq!(report.remaining, 5);

        let left_in_root = fs::read_dir(root.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .count();
        assert_eq!(left_in_root, 5);

        // The next run picks up where this one stopped.
        let report = Executor::new(root.path(), 4).execute(&plan_for(&root)).unwrap();
        assert_eq!(report.moved, 4);
        assert_eq!(report.remaining, 1);
    }

    #[test]
    fn test_zero_budget_executes_nothing() {
        let (_tmp, root) = setup(&["Screenshot 2024-01-01 at 1.png"]);
        let plan = plan_for(&root);
        let report = Executor::new(root.path(), 0).execute(&plan).unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.remaining, 1);
    }

    #[test]
    fn test_existing_target_at_execution_time_is_skipped() {
        let name = "Screenshot 2024-01-01 at 1.png";
        let (_tmp, root) = setup(&[name]);
        let plan = plan_for(&root);

        // Appears between planning and execution.
        let target = root.path().join("01 January").join(name);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "other").unwrap();

        let report = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS)
            .execute(&plan)
            .unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "other");
        assert!(root.path().join(name).exists());
    }

    #[test]
    fn test_failed_move_keeps_parent_directory() {
        let name = "Screenshot 2024-01-01 at 1.png";
        let (_tmp, root) = setup(&[&format!("inbox/{name}")]);
        let plan = plan_for(&root);
        assert_eq!(plan.removal_count(), 1);

        let target = root.path().join("01 January").join(name);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "blocker").unwrap();

        let report = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS)
            .execute(&plan)
            .unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.removed_dirs, 0);
        assert_eq!(report.skipped.len(), 2);
        assert!(root.path().join("inbox").is_dir());
    }

    #[test]
    fn test_non_empty_directory_removal_is_an_error() {
        let (_tmp, root) = setup(&["inbox/Screenshot 2024-01-01 at 1.png"]);
        let plan = plan_for(&root);

        fs::write(root.path().join("inbox/late arrival.txt"), "x").unwrap();

        let result = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS).execute(&plan);
        assert!(matches!(result, Err(ExecuteError::DirectoryNotEmpty { .. })));
    }

    #[test]
    fn test_operations_outside_root_are_rejected() {
        let (_tmp, root) = setup(&["Screenshot 2024-01-01 at 1.png"]);
        let elsewhere = TempDir::new().unwrap();
        let plan = plan_for(&root);

        let other_root = Root::new(elsewhere.path()).unwrap();
        let result = Executor::new(other_root.path(), DEFAULT_MAX_OPERATIONS).execute(&plan);
        assert!(matches!(result, Err(ExecuteError::OutsideRoot { .. })));
        assert!(root.path().join("Screenshot 2024-01-01 at 1.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_layout_directory_is_rejected() {
        let name = "Screenshot 2022-03-14 at 1.png";
        let (_tmp, root) = setup(&[name]);
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("_2022")).unwrap();
        let plan = plan_for(&root);
        assert_eq!(plan.move_count(), 1);

        let result = Executor::new(root.path(), DEFAULT_MAX_OPERATIONS).execute(&plan);

        assert!(matches!(result, Err(ExecuteError::OutsideRoot { .. })));
        assert!(root.path().join(name).is_file());
        assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_step_callback_sees_every_executed_operation() {
        let (_tmp, root) = setup(&[
            "a/Screenshot 2024-01-01 at 1.png",
            "Screenshot 2024-01-02 at 1.png",
        ]);
        let plan = plan_for(&root);

        let mut outcomes = Vec::new();
        Executor::new(root.path(), DEFAULT_MAX_OPERATIONS)
            .execute_with(&plan, |op, outcome| outcomes.push((op.clone(), outcome.clone())))
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].1, StepOutcome::Moved);
        assert_eq!(outcomes[1].1, StepOutcome::Moved);
        assert_eq!(outcomes[2].1, StepOutcome::Removed);
    }
}
