//! Operation planning.
//!
//! The planner turns a scan snapshot into a [`Plan`]: every move needed to put
//! organizable files into their dated directories, followed by removals of
//! directories those moves leave empty. Planning is a pure function of the
//! records it is given and never touches the filesystem.
//!
//! A plan holds at most one operation per destination. Two different sources
//! resolving to the same destination abort planning with
//! [`PlanError::Conflict`] instead of letting one overwrite the other.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

use crate::classifier::{ArtifactKind, Classifier};
use crate::config::CompiledFilters;
use crate::date::{DateResolver, ResolvedDate};
use crate::layout::{self, ArchiveRule, DestinationPath};
use crate::scan::FileRecord;

/// Planning failures. Any of these aborts the run before anything moves.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "conflicting destination {}: both {} and {} would be moved there",
        destination.display(),
        existing.display(),
        incoming.display()
    )]
    Conflict {
        destination: PathBuf,
        existing: PathBuf,
        incoming: PathBuf,
    },
}

/// A single planned filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Rename `source` to `destination`, creating the destination directory.
    Move {
        source: PathBuf,
        destination: DestinationPath,
        kind: ArtifactKind,
        date: ResolvedDate,
    },
    /// Remove a directory that the planned moves leave empty.
    RemoveEmptyDirectory { path: PathBuf },
}

impl Operation {
    /// The path this operation writes to; plans are keyed by it.
    pub fn key(&self) -> &Path {
        match self {
            Operation::Move { destination, .. } => destination.as_path(),
            Operation::RemoveEmptyDirectory { path } => path,
        }
    }

    fn source(&self) -> &Path {
        match self {
            Operation::Move { source, .. } => source,
            Operation::RemoveEmptyDirectory { path } => path,
        }
    }
}

/// Why an organizable file was left where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No date could be resolved for the file.
    UnresolvedDate,
    /// A different file already occupies the destination.
    TargetExists(PathBuf),
    /// The file name cannot be placed under a month directory.
    UnsafeName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnresolvedDate => write!(f, "could not determine date"),
            SkipReason::TargetExists(path) => {
                write!(f, "target already exists: {}", path.display())
            }
            SkipReason::UnsafeName => write!(f, "file name is not a plain path component"),
        }
    }
}

/// An organizable file the plan leaves in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Ordered destination → operation mapping, built once and executed once.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<Operation>,
    index: HashMap<PathBuf, usize>,
    skipped: Vec<SkippedFile>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation under its destination key.
    ///
    /// Re-inserting the same source for the same destination is a no-op; a
    /// different source for a claimed destination is a conflict.
    pub fn insert(&mut self, operation: Operation) -> Result<(), PlanError> {
        if let Some(&position) = self.index.get(operation.key()) {
            let existing = &self.operations[position];
            if existing == &operation {
                return Ok(());
            }
            return Err(PlanError::Conflict {
                destination: operation.key().to_path_buf(),
                existing: existing.source().to_path_buf(),
                incoming: operation.source().to_path_buf(),
            });
        }

        self.index
            .insert(operation.key().to_path_buf(), self.operations.len());
        self.operations.push(operation);
        Ok(())
    }

    fn skip(&mut self, path: &Path, reason: SkipReason) {
        debug!("Skipping {}: {}", path.display(), reason);
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason,
        });
    }

    /// Operations in insertion order: all moves, then directory removals.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The operation planned for `destination`, if any.
    pub fn get(&self, destination: &Path) -> Option<&Operation> {
        self.index.get(destination).map(|&i| &self.operations[i])
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// `(source, destination)` for every planned move.
    pub fn moves(&self) -> impl Iterator<Item = (&Path, &DestinationPath)> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Move {
                source,
                destination,
                ..
            } => Some((source.as_path(), destination)),
            Operation::RemoveEmptyDirectory { .. } => None,
        })
    }

    pub fn move_count(&self) -> usize {
        self.moves().count()
    }

    pub fn removal_count(&self) -> usize {
        self.operations.len() - self.move_count()
    }
}

/// Builds plans from scan snapshots.
#[derive(Debug, Clone)]
pub struct Planner {
    classifier: Classifier,
    resolver: DateResolver,
    rule: ArchiveRule,
    filters: CompiledFilters,
    remove_empty_dirs: bool,
}

impl Planner {
    /// Creates a planner with default filters and directory cleanup enabled.
    pub fn new(classifier: Classifier, resolver: DateResolver, rule: ArchiveRule) -> Self {
        Self {
            classifier,
            resolver,
            rule,
            filters: CompiledFilters::default(),
            remove_empty_dirs: true,
        }
    }

    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_directory_cleanup(mut self, enabled: bool) -> Self {
        self.remove_empty_dirs = enabled;
        self
    }

    /// Computes every operation needed to organize `records` under `root`.
    ///
    /// `records` is the scan of `root`; it is the only view of the filesystem
    /// the planner consults.
    pub fn plan(&self, root: &Path, records: &[FileRecord]) -> Result<Plan, PlanError> {
        let existing: HashSet<&Path> = records
            .iter()
            .filter(|record| !record.is_dir)
            .map(|record| record.path.as_path())
            .collect();

        let mut plan = Plan::new();

        for record in records.iter().filter(|record| !record.is_dir && !record.opaque) {
            let relative = record.path.strip_prefix(root).unwrap_or(&record.path);
            if !self.filters.should_include(relative) {
                trace!("Filtered out {}", relative.display());
                continue;
            }

            let Some(kind) = self.classifier.classify(&record.name) else {
                continue;
            };

            let Some(date) = self.resolver.resolve(record) else {
                plan.skip(&record.path, SkipReason::UnresolvedDate);
                continue;
            };

            let Some(destination) = layout::destination_for(root, &date, &self.rule, &record.name)
            else {
                plan.skip(&record.path, SkipReason::UnsafeName);
                continue;
            };

            if destination.as_path() == record.path {
                trace!("Already in place: {}", relative.display());
                continue;
            }

            if existing.contains(destination.as_path()) {
                plan.skip(
                    &record.path,
                    SkipReason::TargetExists(destination.as_path().to_path_buf()),
                );
                continue;
            }

            plan.insert(Operation::Move {
                source: record.path.clone(),
                destination,
                kind,
                date,
            })?;
        }

        if self.remove_empty_dirs {
            for path in drained_directories(root, records, &plan) {
                plan.insert(Operation::RemoveEmptyDirectory { path })?;
            }
        }

        debug!(
            "Planned {} moves and {} directory removals ({} skipped)",
            plan.move_count(),
            plan.removal_count(),
            plan.skipped().len()
        );
        Ok(plan)
    }
}

/// Directories that end up empty once every planned move has run, deepest first.
///
/// A directory qualifies when it has at least one entry, every entry is a
/// moved file or another qualifying directory, and no destination lies inside it.
fn drained_directories(root: &Path, records: &[FileRecord], plan: &Plan) -> Vec<PathBuf> {
    let moved: HashSet<&Path> = plan.moves().map(|(source, _)| source).collect();
    let protected: HashSet<&Path> = plan
        .moves()
        .flat_map(|(_, destination)| destination.directory().ancestors())
        .filter(|ancestor| ancestor.starts_with(root))
        .collect();

    let mut children: HashMap<&Path, Vec<&FileRecord>> = HashMap::new();
    for record in records {
        children
            .entry(record.parent.as_path())
            .or_default()
            .push(record);
    }

    let mut directories: Vec<&FileRecord> = records
        .iter()
        .filter(|record| record.is_dir && record.path != root && record.path.starts_with(root))
        .collect();
    directories.sort_by(|a, b| {
        depth(&b.path)
            .cmp(&depth(&a.path))
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut drained: HashSet<&Path> = HashSet::new();
    let mut order = Vec::new();

    for directory in directories {
        if protected.contains(directory.path.as_path()) {
            continue;
        }
        let Some(entries) = children.get(directory.path.as_path()) else {
            continue;
        };
        // Opaque entries (symlinks, unreadable files) are never moved, so
        // they keep their directory alive.
        let empties = entries.iter().all(|entry| {
            if entry.is_dir {
                drained.contains(entry.path.as_path())
            } else {
                moved.contains(entry.path.as_path())
            }
        });
        if empties {
            drained.insert(&directory.path);
            order.push(directory.path.clone());
        }
    }

    order
}

fn depth(path: &Path) -> usize {
    path.components().count()
}
