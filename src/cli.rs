//! Command-line interface module for tidywatch.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - One-shot organization of a folder (with dry-run preview)
//! - Watching a folder until the user stops it
//! - Undo and history inspection

use crate::config::AppConfig;
use crate::file_organizer::{FileOrganizer, UndoError};
use crate::output::{ConsoleObserver, OutputFormatter};
use crate::watcher::DirectoryWatcher;
use clap::{ArgAction, Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Sort files into category folders, by hand or as they arrive.
#[derive(Debug, Parser)]
#[command(name = "tidywatch", version, about)]
pub struct Cli {
    /// Configuration file to use instead of the default lookup
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: OrganizeCommand,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum OrganizeCommand {
    /// Organize the files already in a folder
    Organize {
        /// Folder to organize; defaults to the configured watched folder
        dir: Option<PathBuf>,
        /// Show where files would go without moving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Watch a folder and organize new files as they appear
    Watch {
        /// Folder to watch; defaults to the configured watched folder
        dir: Option<PathBuf>,
    },
    /// Move the most recently organized files back
    Undo {
        /// Number of moves to revert
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// List recorded moves, newest first
    History {
        /// Maximum number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Runs a command using the default configuration lookup.
///
/// # Examples
///
/// ```no_run
/// use tidywatch::cli::{run_cli, OrganizeCommand};
/// use std::path::PathBuf;
///
/// let command = OrganizeCommand::Organize {
///     dir: Some(PathBuf::from("/path/to/directory")),
///     dry_run: true,
/// };
/// match run_cli(command) {
///     Ok(()) => println!("Operation completed successfully"),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(command: OrganizeCommand) -> Result<(), String> {
    run_cli_with_config(command, None)
}

/// Runs a command with an optional explicit configuration file.
pub fn run_cli_with_config(
    command: OrganizeCommand,
    config_path: Option<&Path>,
) -> Result<(), String> {
    let config =
        AppConfig::load(config_path).map_err(|e| format!("Error loading configuration: {}", e))?;
    let organizer = FileOrganizer::from_config(&config)
        .map_err(|e| format!("Error compiling filters: {}", e))?;

    match command {
        OrganizeCommand::Organize { dir, dry_run } => {
            let folder = resolve_folder(dir, &config)?;
            if dry_run {
                preview_folder(&organizer, &folder)
            } else {
                organize_folder(&organizer, &folder)
            }
        }
        OrganizeCommand::Watch { dir } => {
            let folder = resolve_folder(dir, &config)?;
            watch_folder(organizer, &folder, config, config_path)
        }
        OrganizeCommand::Undo { steps } => undo_moves(&organizer, steps),
        OrganizeCommand::History { limit } => show_history(&organizer, limit),
    }
}

/// Picks the folder argument, falling back to the configured watched folder.
fn resolve_folder(dir: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf, String> {
    let folder = dir
        .or_else(|| config.watched_folder.clone())
        .ok_or_else(|| "No folder given and no watched folder configured".to_string())?;

    if !folder.is_dir() {
        return Err(format!("Not a directory: {}", folder.display()));
    }
    Ok(folder)
}

/// Organizes every file currently in `folder`, then prints a summary.
fn organize_folder(organizer: &FileOrganizer, folder: &Path) -> Result<(), String> {
    OutputFormatter::info(&format!("Organizing contents of: {}", folder.display()));

    let planned = organizer.plan_folder(folder).map_err(|e| e.to_string())?;
    if planned.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    let progress = OutputFormatter::create_progress_bar(planned.len() as u64);
    let observer = ConsoleObserver::with_progress(progress.clone());
    let organized = organizer
        .organize_all_in_folder(folder, &observer)
        .map_err(|e| e.to_string())?;
    progress.finish_and_clear();

    OutputFormatter::summary_table(&organizer.stats());
    if organized < planned.len() {
        OutputFormatter::warning("Some files were not organized. Please review the messages above.");
    }
    if organizer.options().enable_undo && organized > 0 {
        OutputFormatter::plain("Use 'tidywatch undo' to revert the most recent move.");
    }
    Ok(())
}

/// Shows where each file in `folder` would be filed, without touching anything.
fn preview_folder(organizer: &FileOrganizer, folder: &Path) -> Result<(), String> {
    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", folder.display()));

    let plan = organizer.plan_folder(folder).map_err(|e| e.to_string())?;
    if plan.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for planned in &plan {
        let name = planned
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        OutputFormatter::plain(&format!(" - {} → {}/", name, planned.category));
        *counts.entry(planned.category.clone()).or_insert(0) += 1;
    }

    OutputFormatter::summary_table(&counts);
    OutputFormatter::dry_run_notice("No files were modified. Duplicates are only detected on a real run.");
    Ok(())
}

/// Watches `folder` until Enter is pressed, then prints the session summary.
fn watch_folder(
    organizer: FileOrganizer,
    folder: &Path,
    mut config: AppConfig,
    config_path: Option<&Path>,
) -> Result<(), String> {
    let organizer = Arc::new(organizer);
    let mut watcher = DirectoryWatcher::new(Arc::clone(&organizer));
    watcher
        .start(folder, Arc::new(ConsoleObserver::new()))
        .map_err(|e| e.to_string())?;

    let watched = watcher
        .watched_folder()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| folder.to_path_buf());
    remember_folder(&mut config, watched.clone(), config_path);

    OutputFormatter::info(&format!(
        "Watching {}. Press Enter to stop.",
        watched.display()
    ));
    wait_for_enter();

    watcher.stop();
    OutputFormatter::summary_table(&organizer.stats());
    Ok(())
}

/// Stores the watched folder in the configuration so later commands can omit it.
fn remember_folder(config: &mut AppConfig, folder: PathBuf, config_path: Option<&Path>) {
    if config.watched_folder.as_deref() == Some(folder.as_path()) {
        return;
    }
    config.watched_folder = Some(folder);

    let Some(path) = config_path
        .map(Path::to_path_buf)
        .or_else(AppConfig::default_config_path)
    else {
        return;
    };
    match config.save(&path) {
        Ok(()) => debug!("Saved watched folder to {}", path.display()),
        Err(e) => warn!("Could not save configuration: {}", e),
    }
}

fn wait_for_enter() {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            // No terminal to read from; run until the process is interrupted.
            debug!("stdin closed, watching until interrupted");
            loop {
                thread::park();
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to read from stdin: {}", e),
    }
}

/// Reverts up to `steps` moves, newest first.
fn undo_moves(organizer: &FileOrganizer, steps: usize) -> Result<(), String> {
    for step in 0..steps.max(1) {
        match organizer.undo_last() {
            Ok(record) => {
                let name = record
                    .destination
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                OutputFormatter::success(&format!(
                    "Undone: {} restored to {}",
                    name,
                    record.source.display()
                ));
            }
            Err(UndoError::NothingToUndo) => {
                if step == 0 {
                    OutputFormatter::info(&UndoError::NothingToUndo.to_string());
                }
                break;
            }
            Err(e @ UndoError::FileMissing { .. }) => OutputFormatter::warning(&e.to_string()),
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(())
}

/// Prints the most recent `limit` recorded moves.
fn show_history(organizer: &FileOrganizer, limit: usize) -> Result<(), String> {
    let history = organizer.history();
    if history.is_empty() {
        OutputFormatter::info("No recorded moves.");
        return Ok(());
    }

    let shown = limit.min(history.len());
    OutputFormatter::header(&format!("HISTORY ({} of {})", shown, history.len()));
    OutputFormatter::history_table(history.iter().rev().take(limit));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_organize() {
        let cli = Cli::try_parse_from(["tidywatch", "organize", "/tmp/in", "--dry-run"])
            .expect("parse failed");
        assert_eq!(
            cli.command,
            OrganizeCommand::Organize {
                dir: Some(PathBuf::from("/tmp/in")),
                dry_run: true,
            }
        );
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_defaults_and_globals() {
        let cli = Cli::try_parse_from(["tidywatch", "undo", "-vv", "--config", "my.toml"])
            .expect("parse failed");
        assert_eq!(cli.command, OrganizeCommand::Undo { steps: 1 });
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));

        let cli = Cli::try_parse_from(["tidywatch", "history"]).expect("parse failed");
        assert_eq!(cli.command, OrganizeCommand::History { limit: 20 });
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["tidywatch", "explode"]).is_err());
    }

    #[test]
    fn test_resolve_folder_prefers_argument() {
        let given = TempDir::new().expect("Failed to create temp directory");
        let configured = TempDir::new().expect("Failed to create temp directory");
        let config = AppConfig {
            watched_folder: Some(configured.path().to_path_buf()),
            ..AppConfig::default()
        };

        assert_eq!(
            resolve_folder(Some(given.path().to_path_buf()), &config),
            Ok(given.path().to_path_buf())
        );
        assert_eq!(
            resolve_folder(None, &config),
            Ok(configured.path().to_path_buf())
        );
    }

    #[test]
    fn test_resolve_folder_errors() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(resolve_folder(None, &AppConfig::default()).is_err());
        assert!(resolve_folder(Some(temp_dir.path().join("missing")), &AppConfig::default()).is_err());
    }

    #[test]
    fn test_remember_folder_saves_config() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("settings.toml");
        let mut config = AppConfig::default();

        remember_folder(&mut config, temp_dir.path().to_path_buf(), Some(&config_path));

        let saved = AppConfig::load_from_file(&config_path).expect("config not saved");
        assert_eq!(saved.watched_folder, Some(temp_dir.path().to_path_buf()));
    }
}
