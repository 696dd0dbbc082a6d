//! Command-line interface module for screensort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Configuration loading and flag overrides
//! - Orchestrating scan, plan and execute
//! - Undo operation handling

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::date::{DateResolver, DateSource};
use crate::execute::{ExecutionReport, Executor, StepOutcome};
use crate::history::{MoveRecord, OperationLog};
use crate::layout::ArchiveRuleKind;
use crate::output::OutputFormatter;
use crate::plan::{Operation, Plan, Planner};
use crate::scan::{Root, scan};
use crate::undo::{UndoManager, UndoReport};

/// Sort screenshots and screen recordings into year/month directories.
#[derive(Debug, Parser)]
#[command(name = "screensort", version, about)]
pub struct Args {
    /// Directory to organize
    pub directory: PathBuf,

    /// Show what would be moved without changing anything
    #[arg(long, conflicts_with = "undo")]
    pub dry_run: bool,

    /// Revert the most recent run
    #[arg(long)]
    pub undo: bool,

    /// Configuration file (defaults to .screensortrc.toml, then ~/.config/screensort/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum number of operations to execute in this run
    #[arg(long, value_name = "N")]
    pub max_operations: Option<usize>,

    /// Where file dates are read from
    #[arg(long, value_enum)]
    pub date_source: Option<DateSource>,

    /// Which years get their own `_<year>` directory
    #[arg(long, value_enum)]
    pub archive_rule: Option<ArchiveRuleKind>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn command(&self) -> OrganizeCommand {
        if self.undo {
            OrganizeCommand::Undo
        } else {
            OrganizeCommand::Organize {
                dry_run: self.dry_run,
            }
        }
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            config_path: self.config.clone(),
            max_operations: self.max_operations,
            date_source: self.date_source,
            archive_rule: self.archive_rule,
        }
    }
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizeCommand {
    Organize {
        /// If true, plan without making changes.
        dry_run: bool,
    },
    Undo,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub max_operations: Option<usize>,
    pub date_source: Option<DateSource>,
    pub archive_rule: Option<ArchiveRuleKind>,
}

/// What a run did.
#[derive(Debug)]
pub enum RunSummary {
    Organized {
        planned: usize,
        /// Organizable files the planner left in place.
        plan_skipped: usize,
        report: ExecutionReport,
    },
    DryRun {
        plan: Plan,
    },
    Undone(UndoReport),
}

/// Runs `command` against `dir_path` with configuration discovered the default way.
pub fn run_cli(command: OrganizeCommand, dir_path: &Path) -> Result<RunSummary> {
    run_cli_with_options(command, dir_path, &RunOptions::default())
}

/// Runs `command` against `dir_path`.
///
/// Errors returned from here are fatal: the directory is unusable, the
/// configuration is invalid, the plan has a conflict, or execution hit an
/// invariant violation.
pub fn run_cli_with_options(
    command: OrganizeCommand,
    dir_path: &Path,
    options: &RunOptions,
) -> Result<RunSummary> {
    let root = Root::new(dir_path).context("Target directory is not usable")?;

    match command {
        OrganizeCommand::Organize { dry_run } => organize(&root, options, dry_run),
        OrganizeCommand::Undo => undo_organization(&root),
    }
}

fn build_planner(config: &Config, options: &RunOptions) -> Result<Planner> {
    let mut organize = config.organize.clone();
    if let Some(source) = options.date_source {
        organize.date_source = source;
    }
    if let Some(rule) = options.archive_rule {
        organize.archive_rule = rule;
    }

    let filters = config.compile().context("Error compiling filters")?;
    let rule = organize.archive_rule().context("Error in [organize] settings")?;

    Ok(Planner::new(
        organize.classifier(),
        DateResolver::new(organize.date_source),
        rule,
    )
    .with_filters(filters)
    .with_directory_cleanup(organize.remove_empty_dirs))
}

fn organize(root: &Root, options: &RunOptions, dry_run: bool) -> Result<RunSummary> {
    let config =
        Config::load(options.config_path.as_deref()).context("Error loading configuration")?;
    let planner = build_planner(&config, options)?;
    let max_operations = options
        .max_operations
        .unwrap_or(config.organize.max_operations);

    if dry_run {
        OutputFormatter::dry_run_notice(&format!(
            "Analyzing contents of: {}",
            root.path().display()
        ));
    } else {
        OutputFormatter::info(&format!("Organizing contents of: {}", root.path().display()));
    }

    let records = scan(root)?;
    info!("Scanned {} entries", records.len());

    let plan = planner.plan(root.path(), &records)?;

    for skipped in plan.skipped() {
        OutputFormatter::warning(&format!(
            "{}: {}",
            relative(root, &skipped.path).display(),
            skipped.reason
        ));
    }

    if plan.is_empty() {
        OutputFormatter::success("Nothing to organize.");
        return Ok(if dry_run {
            RunSummary::DryRun { plan }
        } else {
            RunSummary::Organized {
                planned: 0,
                plan_skipped: plan.skipped().len(),
                report: ExecutionReport::default(),
            }
        });
    }

    if dry_run {
        print_dry_run(root, &plan, max_operations);
        return Ok(RunSummary::DryRun { plan });
    }

    let pb = OutputFormatter::create_progress_bar(plan.len().min(max_operations) as u64);
    let mut performed: Vec<MoveRecord> = Vec::new();
    let executor = Executor::new(root.path(), max_operations);
    let report = executor.execute_with(&plan, |operation, outcome| {
        match (operation, outcome) {
            (
                Operation::Move {
                    source,
                    destination,
                    ..
                },
                StepOutcome::Moved,
            ) => performed.push(MoveRecord {
                original_path: source.clone(),
                new_path: destination.as_path().to_path_buf(),
            }),
            (_, StepOutcome::Skipped(reason)) => pb.suspend(|| {
                OutputFormatter::warning(&format!(
                    "{}: {}",
                    relative(root, operation.key()).display(),
                    reason
                ))
            }),
            _ => {}
        }
        pb.inc(1);
    });
    pb.finish_and_clear();

    // Moves made before an aborted run must stay undoable.
    save_history(root, &performed);
    let report = report?;

    print_summary(&plan, &report);

    Ok(RunSummary::Organized {
        planned: plan.len(),
        plan_skipped: plan.skipped().len(),
        report,
    })
}

fn save_history(root: &Root, moves: &[MoveRecord]) {
    if moves.is_empty() {
        return;
    }

    let mut log = OperationLog::new(root.path().to_path_buf());
    for record in moves {
        log.add_operation(record.clone());
    }
    match log.save(root.path()) {
        Ok(()) => OutputFormatter::plain(&format!(
            "History saved. Use 'screensort {} --undo' to revert changes.",
            root.path().display()
        )),
        Err(e) => OutputFormatter::warning(&format!("Could not save history: {}", e)),
    }
}

fn print_dry_run(root: &Root, plan: &Plan, max_operations: usize) {
    OutputFormatter::header("DRY RUN: Planned operations");
    for operation in plan.operations() {
        match operation {
            Operation::Move {
                source,
                destination,
                ..
            } => {
                OutputFormatter::plain(&format!(" - {}", relative(root, source).display()));
                OutputFormatter::plain(&format!(
                    "   → Would move to {}",
                    relative(root, destination.as_path()).display()
                ));
            }
            Operation::RemoveEmptyDirectory { path } => OutputFormatter::plain(&format!(
                " - Would remove empty directory {}",
                relative(root, path).display()
            )),
        }
    }

    OutputFormatter::summary_table("DRY RUN SUMMARY", &kind_counts(plan, plan.len()));
    if plan.len() > max_operations {
        OutputFormatter::warning(&format!(
            "Only the first {} of {} operations would run in one pass.",
            max_operations,
            plan.len()
        ));
    }
    OutputFormatter::dry_run_notice("No files were modified.");
}

fn print_summary(plan: &Plan, report: &ExecutionReport) {
    let executed = plan.len() - report.remaining;
    OutputFormatter::summary_table("SUMMARY", &kind_counts(plan, executed));
    OutputFormatter::plain(&format!("Moved: {}", report.moved));
    if report.removed_dirs > 0 {
        OutputFormatter::plain(&format!("Removed empty directories: {}", report.removed_dirs));
    }

    let skipped = plan.skipped().len() + report.skipped.len();
    if skipped > 0 {
        OutputFormatter::warning(&format!("Skipped: {}", skipped));
    }
    if report.remaining > 0 {
        OutputFormatter::warning(&format!(
            "{} operations were left for the next run (operation limit reached).",
            report.remaining
        ));
    }
    OutputFormatter::success("Organization complete!");
}

/// Planned moves per artifact kind among the first `limit` operations.
fn kind_counts(plan: &Plan, limit: usize) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for operation in plan.operations().iter().take(limit) {
        if let Operation::Move { kind, .. } = operation {
            *counts.entry(kind.label()).or_insert(0) += 1;
        }
    }
    counts
}

fn relative<'a>(root: &Root, path: &'a Path) -> &'a Path {
    path.strip_prefix(root.path()).unwrap_or(path)
}

fn undo_organization(root: &Root) -> Result<RunSummary> {
    OutputFormatter::info("Undoing previous organization...");

    let report = UndoManager::undo(root.path()).context("Undo failed")?;

    OutputFormatter::success("Undo complete!");
    OutputFormatter::plain(&format!("  Restored: {}", report.restored_files));

    if !report.skipped_files.is_empty() {
        OutputFormatter::warning(&format!("  Skipped: {}", report.skipped_files.len()));
        for (path, reason) in &report.skipped_files {
            OutputFormatter::plain(&format!("    - {}: {}", path.display(), reason));
        }
    }

    if !report.failed_restores.is_empty() {
        OutputFormatter::error(&format!("  Failed: {}", report.failed_restores.len()));
        for (path, reason) in &report.failed_restores {
            OutputFormatter::error(&format!("    - {}: {}", path.display(), reason));
        }
        OutputFormatter::warning("History file was NOT deleted due to failures.");
    }

    Ok(RunSummary::Undone(report))
}
