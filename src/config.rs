//! Application configuration and file filtering.
//!
//! Configuration is a TOML file holding the category table, the watched folder, the
//! duplicate/undo switches, where history is stored, and optional exclusion rules.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! watched_folder = "/home/user/Downloads"
//! enable_duplicates = true
//! enable_undo = true
//! history_limit = 100
//!
//! [[categories]]
//! name = "Images"
//! extensions = [".jpg", ".png"]
//!
//! [filters.exclude]
//! filenames = ["desktop.ini"]
//! patterns = ["*.part", "*.crdownload"]
//! extensions = ["tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::file_category::{CategoryRule, CategoryTable, default_rules};
use crate::history::HISTORY_LIMIT;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "tidywatch.toml";

/// File names the organizer never moves, wherever they appear.
pub const RESERVED_FILE_NAMES: &[&str] = &[
    CONFIG_FILE_NAME,
    "config.json",
    "history.json",
    "stats.json",
];

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("IO error on configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not serialize configuration: {0}")]
    Serialize(String),
}

/// The persisted application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Folder monitored by `watch` and organized by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_folder: Option<PathBuf>,

    /// Route byte-identical files to the duplicates folder.
    pub enable_duplicates: bool,

    /// Record moves so they can be undone.
    pub enable_undo: bool,

    /// Where the move history is stored. Defaults to the state directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,

    /// How many moves the history keeps.
    pub history_limit: usize,

    /// Category rules, in classification order.
    pub categories: Vec<CategoryRule>,

    /// Additional exclusion rules.
    pub filters: FilterRules,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watched_folder: None,
            enable_duplicates: true,
            enable_undo: true,
            history_file: None,
            history_limit: HISTORY_LIMIT,
            categories: default_rules(),
            filters: FilterRules::default(),
        }
    }
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "desktop.ini", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.part", "*.crdownload").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude, with or without the dot (e.g., "tmp", ".log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `tidywatch.toml` in the current directory
    /// 3. Look for `~/.config/tidywatch/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(home_config) = Self::default_config_path()
            && home_config.exists()
        {
            return Self::load_from_file(&home_config);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Write this configuration to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, content).map_err(io_error)
    }

    /// `~/.config/tidywatch/config.toml`, if a home directory is known.
    pub fn default_config_path() -> Option<PathBuf> {
        state_dir().map(|dir| dir.join("config.toml"))
    }

    /// The history file to use: the configured one, else `history.json` in the state directory.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file
            .clone()
            .or_else(|| state_dir().map(|dir| dir.join("history.json")))
    }

    /// The category table described by this configuration.
    pub fn category_table(&self) -> CategoryTable {
        CategoryTable::new(self.categories.clone())
    }

    /// Compile the filter rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// `~/.config/tidywatch`, if a home directory is known.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("tidywatch"))
}

/// Compiled filter structures for efficient file matching.
///
/// Hidden files and reserved state/configuration names are always rejected; the
/// configured rules can only exclude more.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

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
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a file should be organized.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Hidden file (leading `.`) - always excluded
    /// 2. Reserved state/configuration name - always excluded
    /// 3. Include patterns (whitelist) - if matched, include
    /// 4. Exact filename match - if matched, exclude
    /// 5. File extension match - if matched, exclude
    /// 6. Glob pattern match - if matched, exclude
    /// 7. Regex pattern match - if matched, exclude
    /// 8. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if file_name.is_empty() || is_hidden(&file_name) || is_reserved(&file_name) {
            return false;
        }

        if matches_any(&self.include_patterns, file_path, &file_name) {
            return true;
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

        if matches_any(&self.exclude_patterns, file_path, &file_name) {
            return false;
        }

        if self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
        {
            return false;
        }

        true
    }
}

/// Whether a file name marks a hidden file.
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

/// Whether a file name is one of the reserved state/configuration names.
pub fn is_reserved(file_name: &str) -> bool {
    RESERVED_FILE_NAMES.contains(&file_name)
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

// Patterns are tried against the bare name and the full path, so both
// `*.part` and `downloads/**` style rules work.
fn matches_any(patterns: &[Pattern], file_path: &Path, file_name: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches(file_name) || pattern.matches_path(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn compile(exclude: ExcludeRules, include: IncludeRules) -> CompiledFilters {
        CompiledFilters::new(&FilterRules { exclude, include }).expect("Failed to compile")
    }

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert!(config.enable_duplicates);
        assert!(config.enable_undo);
        assert_eq!(config.history_limit, HISTORY_LIMIT);
        assert_eq!(config.categories.last().map(|r| r.name.as_str()), Some("Others"));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").expect("Failed to parse");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_categories_keeps_order() {
        let config: AppConfig = toml::from_str(
            r#"
            enable_duplicates = false

            [[categories]]
            name = "Web"
            extensions = [".html"]

            [[categories]]
            name = "Code"
            extensions = ["HTML", "rs"]
            "#,
        )
        .expect("Failed to parse");

        assert!(!config.enable_duplicates);
        assert!(config.enable_undo);
        let table = config.category_table();
        assert_eq!(table.categories().collect::<Vec<_>>(), vec!["Web", "Code"]);
        assert_eq!(table.classify("index.html"), "Web");
        assert_eq!(table.classify("main.rs"), "Code");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("tidywatch.toml");
        fs::write(&path, "enable_undo = \"maybe\"").expect("Failed to write config");

        let result = AppConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = AppConfig::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = AppConfig {
            watched_folder: Some(temp_dir.path().to_path_buf()),
            enable_undo: false,
            ..AppConfig::default()
        };
        config.save(&path).expect("Failed to save config");

        let loaded = AppConfig::load(Some(&path)).expect("Failed to load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_hidden_and_reserved_always_excluded() {
        let compiled = compile(
            ExcludeRules::default(),
            IncludeRules {
                patterns: vec![".important".to_string(), "history.json".to_string()],
            },
        );

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new("/base/history.json")));
        assert!(!compiled.should_include(Path::new("/base/tidywatch.toml")));
        assert!(compiled.should_include(Path::new("/base/photo.jpg")));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let compiled = compile(
            ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_exclude_extensions() {
        let compiled = compile(
            ExcludeRules {
                extensions: vec!["bak".to_string(), ".tmp".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("file.bak")));
        assert!(!compiled.should_include(Path::new("file.tmp")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_exclude_glob_patterns_match_file_name() {
        let compiled = compile(
            ExcludeRules {
                patterns: vec!["*.part".to_string(), "[0-9]*.tmp".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("/downloads/movie.mkv.part")));
        assert!(!compiled.should_include(Path::new("/downloads/1cache.tmp")));
        assert!(compiled.should_include(Path::new("/downloads/cache.tmp")));
        assert!(compiled.should_include(Path::new("/downloads/movie.mkv")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = compile(
            ExcludeRules {
                extensions: vec!["log".to_string()],
                ..Default::default()
            },
            IncludeRules {
                patterns: vec!["keep-*.log".to_string()],
            },
        );

        assert!(compiled.should_include(Path::new("keep-this.log")));
        assert!(!compiled.should_include(Path::new("other.log")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = compile(
            ExcludeRules {
                regex: vec![r"^test_.*\.txt$".to_string()],
                ..Default::default()
            },
            IncludeRules::default(),
        );

        assert!(!compiled.should_include(Path::new("test_file.txt")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_invalid_regex_returns_error() {
        let rules = FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        };

        assert!(matches!(
            CompiledFilters::new(&rules),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_glob_pattern_returns_error() {
        let rules = FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        };

        assert!(matches!(
            CompiledFilters::new(&rules),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
