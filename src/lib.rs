//! screensort - move screenshots and screen recordings into dated directories
//!
//! A run scans the target directory, builds a complete plan of moves and
//! directory removals, checks it for conflicting destinations, and only then
//! executes it, bounded by a maximum number of operations per run.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod date;
pub mod execute;
pub mod history;
pub mod layout;
pub mod logging;
pub mod output;
pub mod plan;
pub mod scan;
pub mod undo;

pub use classifier::{ArtifactKind, Classifier};
pub use cli::{OrganizeCommand, RunOptions, RunSummary, run_cli, run_cli_with_options};
pub use config::{CompiledFilters, Config, ConfigError};
pub use date::{DateResolver, DateSource, ResolvedDate};
pub use execute::{ExecuteError, ExecutionReport, Executor};
pub use layout::{ArchiveRule, DestinationPath};
pub use plan::{Operation, Plan, PlanError, Planner};
pub use scan::{FileRecord, Root, ScanError, scan};
pub use undo::{UndoManager, UndoReport};
