//! Destination layout under the organizer root.
//!
//! Archival years live under `<root>/_<year>/<MM Month>/`, everything else
//! directly under `<root>/<MM Month>/`.

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::date::ResolvedDate;

/// Month directory names, indexed by `month - 1`.
pub const MONTH_NAMES: [&str; 12] = [
    "01 January",
    "02 February",
    "03 March",
    "04 April",
    "05 May",
    "06 June",
    "07 July",
    "08 August",
    "09 September",
    "10 October",
    "11 November",
    "12 December",
];

/// Returns the month directory name for `month` in `1..=12`.
pub fn month_dir_name(month: u32) -> Option<&'static str> {
    let index = usize::try_from(month).ok()?.checked_sub(1)?;
    MONTH_NAMES.get(index).copied()
}

/// Decides which years are bucketed under a `_<year>` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveRule {
    /// Years in `first..=last` are archival.
    FixedRange { first: i32, last: i32 },
    /// Years strictly before the given year are archival.
    BeforeYear(i32),
}

impl ArchiveRule {
    /// The default cutoff: 2020 through 2023.
    pub const DEFAULT: ArchiveRule = ArchiveRule::FixedRange {
        first: 2020,
        last: 2023,
    };

    /// Archives every year before the current local calendar year.
    pub fn before_current_year() -> Self {
        ArchiveRule::BeforeYear(Local::now().year())
    }

    pub fn is_archival(&self, year: i32) -> bool {
        match *self {
            ArchiveRule::FixedRange { first, last } => (first..=last).contains(&year),
            ArchiveRule::BeforeYear(cutoff) => year < cutoff,
        }
    }
}

impl Default for ArchiveRule {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Name of an archive rule as written in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveRuleKind {
    #[default]
    FixedRange,
    BeforeCurrentYear,
}

/// A file destination that is guaranteed to lie under the organizer root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationPath(PathBuf);

impl DestinationPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Directory the file lands in.
    pub fn directory(&self) -> &Path {
        self.0.parent().unwrap_or(&self.0)
    }
}

impl AsRef<Path> for DestinationPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Month directory for `date` under `root`.
pub fn target_directory(root: &Path, date: &ResolvedDate, rule: &ArchiveRule) -> PathBuf {
    // ResolvedDate guarantees month is in 1..=12.
    let month = month_dir_name(date.month()).unwrap_or(MONTH_NAMES[0]);
    if rule.is_archival(date.year()) {
        root.join(format!("_{}", date.year())).join(month)
    } else {
        root.join(month)
    }
}

/// Full destination of `file_name` dated `date`.
///
/// Returns `None` when `file_name` is not a single plain path component,
/// since joining it could escape the month directory.
pub fn destination_for(
    root: &Path,
    date: &ResolvedDate,
    rule: &ArchiveRule,
    file_name: &str,
) -> Option<DestinationPath> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => {}
        _ => return None,
    }

    let path = target_directory(root, date, rule).join(file_name);
    debug_assert!(path.starts_with(root));
    Some(DestinationPath(path))
}
