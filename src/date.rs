//! Calendar date resolution for organizable files.
//!
//! A file's date comes either from its name (an ordered list of patterns, the
//! first valid match wins) or from its filesystem metadata (creation time when
//! the platform reports one, otherwise modification time).
//!
//! # Examples
//!
//! ```
//! use screensort::date::{DateResolver, ResolvedDate};
//!
//! let resolver = DateResolver::default();
//! assert_eq!(
//!     resolver.from_filename("Screenshot 2022-03-14 at 10.00.00 AM.png"),
//!     ResolvedDate::new(2022, 3, 14)
//! );
//! assert_eq!(resolver.from_filename("holiday.png"), None);
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::SystemTime;

use crate::scan::FileRecord;

/// Earliest year a resolved date may carry.
pub const MIN_YEAR: i32 = 2020;

/// Latest year accepted from a filename.
pub const MAX_FILENAME_YEAR: i32 = 2030;

static FILENAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d{4})-(\d{2})-(\d{2})",
        r"(\d{4})(\d{2})(\d{2})[_-]",
        r"(\d{4})\.(\d{2})\.(\d{2})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("built-in date pattern is valid"))
    .collect()
});

/// A calendar date with `year >= 2020` that is a real day of that month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedDate {
    year: i32,
    month: u32,
    day: u32,
}

impl ResolvedDate {
    /// Builds a date, rejecting years before 2020 and impossible days.
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        if year < MIN_YEAR {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month in `1..=12`.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Day in `1..=31`.
    pub fn day(&self) -> u32 {
        self.day
    }
}

impl fmt::Display for ResolvedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Where a file's date is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DateSource {
    /// Only the patterns embedded in the file name.
    #[default]
    Filename,
    /// Only the filesystem timestamps.
    Metadata,
    /// File name first, falling back to the filesystem timestamps.
    Auto,
}

/// Resolves a [`ResolvedDate`] for scanned files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateResolver {
    source: DateSource,
}

impl DateResolver {
    pub fn new(source: DateSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> DateSource {
        self.source
    }

    /// Resolves the date of a scanned file according to the configured source.
    pub fn resolve(&self, record: &FileRecord) -> Option<ResolvedDate> {
        match self.source {
            DateSource::Filename => self.from_filename(&record.name),
            DateSource::Metadata => self.from_timestamps(record.created, record.modified),
            DateSource::Auto => self
                .from_filename(&record.name)
                .or_else(|| self.from_timestamps(record.created, record.modified)),
        }
    }

    /// Matches the name against the built-in patterns in order.
    ///
    /// A pattern whose captures are out of range counts as no match and the
    /// next pattern is tried. Empty names never resolve.
    pub fn from_filename(&self, name: &str) -> Option<ResolvedDate> {
        if name.is_empty() {
            return None;
        }

        FILENAME_PATTERNS.iter().find_map(|pattern| {
            pattern.captures_iter(name).find_map(|caps| {
                let year: i32 = caps[1].parse().ok()?;
                let month: u32 = caps[2].parse().ok()?;
                let day: u32 = caps[3].parse().ok()?;
                if year > MAX_FILENAME_YEAR {
                    return None;
                }
                ResolvedDate::new(year, month, day)
            })
        })
    }

    /// Uses the creation time if present, else the modification time.
    pub fn from_timestamps(
        &self,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> Option<ResolvedDate> {
        let timestamp = created.or(modified)?;
        let local: DateTime<Local> = timestamp.into();
        ResolvedDate::new(local.year(), local.month(), local.day())
    }
}
