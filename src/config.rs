//! TOML configuration: file filters and organizing options.
//!
//! Filters decide which files the planner may look at at all; the
//! `[organize]` table tunes how organizable files are dated and placed.
//! Filter patterns are matched against paths relative to the organizer root.
//!
//! # Configuration File Format
//!
//! ```toml
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store"]
//! patterns = ["Archive/**"]
//! extensions = ["tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [organize]
//! max_operations = 5000
//! date_source = "filename"          # filename | metadata | auto
//! archive_rule = "fixed-range"      # fixed-range | before-current-year
//! archive_first_year = 2020
//! archive_last_year = 2023
//! include_audio = false
//! extra_markers = []
//! remove_empty_dirs = true
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classifier::Classifier;
use crate::date::DateSource;
use crate::execute::DEFAULT_MAX_OPERATIONS;
use crate::layout::{ArchiveRule, ArchiveRuleKind};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".screensortrc.toml";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("Invalid archive range: first year {first} is after last year {last}")]
    InvalidArchiveRange { first: i32, last: i32 },
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filters: FilterRules,
    #[serde(default)]
    pub organize: OrganizeConfig,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to consider hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist, overrides exclude rules.
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns relative to the root (e.g. "Keep/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Compared case-insensitively.
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Options for dating and placing files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeConfig {
    /// Upper bound on operations executed in one run.
    pub max_operations: usize,
    pub date_source: DateSource,
    pub archive_rule: ArchiveRuleKind,
    /// First archival year for the fixed-range rule.
    pub archive_first_year: i32,
    /// Last archival year for the fixed-range rule.
    pub archive_last_year: i32,
    /// Treat `mp3` captures as recordings.
    pub include_audio: bool,
    /// Markers recognized in addition to the built-in ones.
    pub extra_markers: Vec<String>,
    pub remove_empty_dirs: bool,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            date_source: DateSource::default(),
            archive_rule: ArchiveRuleKind::default(),
            archive_first_year: 2020,
            archive_last_year: 2023,
            include_audio: false,
            extra_markers: Vec::new(),
            remove_empty_dirs: true,
        }
    }
}

impl OrganizeConfig {
    /// Resolves the configured archive rule.
    ///
    /// `before-current-year` reads the local clock here, once, so that
    /// planning itself never does.
    pub fn archive_rule(&self) -> Result<ArchiveRule, ConfigError> {
        match self.archive_rule {
            ArchiveRuleKind::FixedRange => {
                if self.archive_first_year > self.archive_last_year {
                    return Err(ConfigError::InvalidArchiveRange {
                        first: self.archive_first_year,
                        last: self.archive_last_year,
                    });
                }
                Ok(ArchiveRule::FixedRange {
                    first: self.archive_first_year,
                    last: self.archive_last_year,
                })
            }
            ArchiveRuleKind::BeforeCurrentYear => Ok(ArchiveRule::before_current_year()),
        }
    }

    /// Builds the classifier described by this configuration.
    pub fn classifier(&self) -> Classifier {
        let mut classifier = Classifier::new(self.include_audio);
        for marker in &self.extra_markers {
            classifier.add_marker(marker);
        }
        classifier
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.screensortrc.toml` in the current directory
    /// 3. Look for `~/.config/screensort/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("screensort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Compile the filter rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Filter rules with every pattern pre-compiled.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a root-relative path may be organized.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_exclude(exclude: ExcludeRules) -> CompiledFilters {
        let config = Config {
            filters: FilterRules {
                enable_hidden_files: true,
                exclude,
                include: IncludeRules::default(),
            },
            ..Default::default()
        };
        config.compile().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.filters.enable_hidden_files);
        assert_eq!(config.organize.max_operations, 5000);
        assert_eq!(config.organize.date_source, DateSource::Filename);
        assert_eq!(config.organize.archive_rule().unwrap(), ArchiveRule::DEFAULT);
        assert!(config.organize.remove_empty_dirs);
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = Config::default().compile().unwrap();

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new("inbox/.Screenshot 2022-01-01.png")));
        assert!(compiled.should_include(Path::new("Screenshot 2022-01-01.png")));
    }

    #[test]
    fn test_exclude_exact_filename_and_extension() {
        let compiled = with_exclude(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            extensions: vec!["GIF".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new("Screenshot 2022-01-01.gif")));
        assert!(compiled.should_include(Path::new("Screenshot 2022-01-01.png")));
    }

    #[test]
    fn test_exclude_glob_relative_to_root() {
        let compiled = with_exclude(ExcludeRules {
            patterns: vec!["Keep/**".to_string(), "**/drafts/**".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("Keep/Screenshot 2022-01-01.png")));
        assert!(!compiled.should_include(Path::new("a/drafts/Screenshot 2022-01-01.png")));
        assert!(compiled.should_include(Path::new("Keeper/Screenshot 2022-01-01.png")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = with_exclude(ExcludeRules {
            regex: vec![r"(?i)^screenshot .* copy\.png$".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("Screenshot 2022-01-01 copy.png")));
        assert!(compiled.should_include(Path::new("Screenshot 2022-01-01.png")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let config = Config {
            filters: FilterRules {
                enable_hidden_files: false,
                exclude: ExcludeRules::default(),
                include: IncludeRules {
                    patterns: vec![".Screenshot*".to_string()],
                },
            },
            ..Default::default()
        };
        let compiled = config.compile().unwrap();

        assert!(compiled.should_include(Path::new(".Screenshot 2022-01-01.png")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_invalid_patterns_return_errors() {
        let bad_regex = Config {
            filters: FilterRules {
                exclude: ExcludeRules {
                    regex: vec!["[invalid(".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_regex.compile(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = Config {
            filters: FilterRules {
                exclude: ExcludeRules {
                    patterns: vec!["[invalid".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_glob.compile(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }

    #[test]
    fn test_parse_organize_section() {
        let config = Config::from_toml(
            r#"
            [organize]
            max_operations = 10
            date_source = "auto"
            archive_rule = "before-current-year"
            include_audio = true
            extra_markers = ["Capture"]
            remove_empty_dirs = false
            "#,
        )
        .unwrap();

        assert_eq!(config.organize.max_operations, 10);
        assert_eq!(config.organize.date_source, DateSource::Auto);
        assert_eq!(config.organize.archive_rule, ArchiveRuleKind::BeforeCurrentYear);
        assert!(matches!(
            config.organize.archive_rule().unwrap(),
            ArchiveRule::BeforeYear(_)
        ));
        assert!(!config.organize.remove_empty_dirs);
        assert!(config.organize.classifier().is_organizable("capture 2022-01-01.mp3"));
        // Unspecified keys keep their defaults.
        assert_eq!(config.organize.archive_first_year, 2020);
        assert!(!config.filters.enable_hidden_files);
    }

    #[test]
    fn test_invalid_archive_range() {
        let config = Config::from_toml(
            r#"
            [organize]
            archive_first_year = 2024
            archive_last_year = 2021
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.organize.archive_rule(),
            Err(ConfigError::InvalidArchiveRange { first: 2024, last: 2021 })
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("[organize\nmax_operations = 1"),
            Err(ConfigError::ConfigInvalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[organize]\ndate_source = \"sundial\""),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/non/existent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[filters]\nenable_hidden_files = true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.filters.enable_hidden_files);
        assert_eq!(config.organize, OrganizeConfig::default());
    }
}
