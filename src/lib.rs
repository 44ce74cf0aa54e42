//! tidywatch - keep a folder tidy by sorting files into category subdirectories
//!
//! This library provides extension-based categorization, content fingerprints for
//! duplicate detection, a bounded undo history, a thread-safe organization engine,
//! a background folder watcher, and TOML configuration with file filtering rules.

pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod fingerprint;
pub mod history;
pub mod logging;
pub mod output;
pub mod watcher;

pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use file_category::{CategoryRule, CategoryTable};
pub use file_organizer::{FileOrganizer, OrganizeError, OrganizeObserver, OrganizeOptions, UndoError};
pub use history::{HistoryLedger, MoveRecord};
pub use watcher::{DirectoryWatcher, EventSource, NotifySource, WatchError};

pub use cli::{Cli, OrganizeCommand, run_cli, run_cli_with_config};
