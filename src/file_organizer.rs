//! File organization engine.
//!
//! [`FileOrganizer`] classifies a file, checks whether its content was already seen
//! this session, picks a free destination name inside the category subdirectory and
//! moves the file there. Successful moves are recorded in the [`HistoryLedger`] for
//! undo and counted per category.
//!
//! The category table, duplicate index, history and statistics live behind a single
//! lock, so only one organize or undo runs at a time. A separate in-flight set lets the
//! watcher and a batch pass agree on who is handling a given path.
use crate::config::{AppConfig, CompiledFilters, ConfigError};
use crate::file_category::{CategoryTable, DUPLICATES, split_file_name};
use crate::fingerprint::{Digest, fingerprint};
use crate::history::{HistoryLedger, MoveRecord};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during file organization operations.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    /// Failed to move a file to its category directory.
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// The base directory path is invalid or doesn't exist.
    #[error("Invalid base path {}: {source}", .path.display())]
    InvalidBasePath { path: PathBuf, source: io::Error },
    /// Failed to list a directory for a batch pass.
    #[error("Failed to read directory {}: {source}", .path.display())]
    DirectoryReadFailed { path: PathBuf, source: io::Error },
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Reasons an undo did not happen.
#[derive(Debug, Error)]
pub enum UndoError {
    /// The history is empty.
    #[error("No operations to undo")]
    NothingToUndo,
    /// The moved file is gone; its record has been dropped.
    #[error("File no longer exists: {}", .path.display())]
    FileMissing { path: PathBuf },
    /// Moving the file back failed; its record has been restored.
    #[error("Failed to restore {} to {}: {source}", .from.display(), .to.display())]
    RestoreFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Receives user-visible outcomes from the watcher and batch passes.
pub trait OrganizeObserver: Send + Sync {
    /// Called once per successful relocation.
    fn on_organized(&self, message: &str);

    /// Called for non-fatal failures the user should see.
    fn on_error(&self, message: &str);
}

/// Switches controlling optional behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizeOptions {
    /// Route files whose content was already seen to the duplicates folder.
    pub detect_duplicates: bool,
    /// Record every move in the history ledger.
    pub enable_undo: bool,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            detect_duplicates: true,
            enable_undo: true,
        }
    }
}

/// How a file would be placed by a batch pass, without moving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub path: PathBuf,
    pub category: String,
}

struct OrganizerState {
    table: CategoryTable,
    options: OrganizeOptions,
    duplicates: HashMap<Digest, PathBuf>,
    history: HistoryLedger,
    stats: BTreeMap<String, u64>,
}

/// Organizes files by moving them into category subdirectories.
///
/// Shared between the watcher thread and synchronous callers, typically behind an `Arc`.
pub struct FileOrganizer {
    filters: CompiledFilters,
    state: Mutex<OrganizerState>,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl FileOrganizer {
    /// Creates an organizer with its own duplicate index and statistics.
    pub fn new(
        table: CategoryTable,
        filters: CompiledFilters,
        options: OrganizeOptions,
        history: HistoryLedger,
    ) -> Self {
        Self {
            filters,
            state: Mutex::new(OrganizerState {
                table,
                options,
                duplicates: HashMap::new(),
                history,
                stats: BTreeMap::new(),
            }),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Builds an organizer from the application configuration.
    ///
    /// An unreadable history file is logged and replaced by an empty ledger at the
    /// same location.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let filters = config.compile_filters()?;
        let options = OrganizeOptions {
            detect_duplicates: config.enable_duplicates,
            enable_undo: config.enable_undo,
        };

        let history = match config.history_path() {
            Some(path) => HistoryLedger::open(&path, config.history_limit).unwrap_or_else(|e| {
                warn!("Starting with empty history: {}", e);
                HistoryLedger::fresh(&path, config.history_limit)
            }),
            None => {
                warn!("No location for the history file; undo will not survive restarts");
                HistoryLedger::in_memory(config.history_limit)
            }
        };

        Ok(Self::new(config.category_table(), filters, options, history))
    }

    /// Moves a file into its category directory within `base_folder`.
    ///
    /// Returns `Ok(None)` when there is nothing to do: the path is missing, is a
    /// directory, is hidden or reserved, or is excluded by the filters. Otherwise the
    /// final destination is returned.
    ///
    /// # Errors
    ///
    /// Directory creation and move failures are returned and leave the file where it
    /// was, with no history entry and no statistics change. A file whose content cannot
    /// be read for the duplicate check is organized by category as usual.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tidywatch::config::CompiledFilters;
    /// use tidywatch::file_category::CategoryTable;
    /// use tidywatch::file_organizer::{FileOrganizer, OrganizeOptions};
    /// use tidywatch::history::HistoryLedger;
    /// use std::path::Path;
    ///
    /// let organizer = FileOrganizer::new(
    ///     CategoryTable::default(),
    ///     CompiledFilters::default(),
    ///     OrganizeOptions::default(),
    ///     HistoryLedger::in_memory(100),
    /// );
    ///
    /// match organizer.organize(Path::new("/downloads/photo.jpg"), Path::new("/downloads")) {
    ///     Ok(Some(dest)) => println!("Moved to {}", dest.display()),
    ///     Ok(None) => println!("Nothing to do"),
    ///     Err(e) => eprintln!("Organization failed: {}", e),
    /// }
    /// ```
    pub fn organize(&self, file_path: &Path, base_folder: &Path) -> OrganizeResult<Option<PathBuf>> {
        let Ok(metadata) = fs::metadata(file_path) else {
            debug!("Skipping {}: no longer exists", file_path.display());
            return Ok(None);
        };
        if metadata.is_dir() {
            return Ok(None);
        }
        let Some(file_name) = file_path.file_name() else {
            return Ok(None);
        };
        if !self.filters.should_include(file_path) {
            debug!("Skipping {}: excluded", file_path.display());
            return Ok(None);
        }

        if !base_folder.is_dir() {
            return Err(OrganizeError::InvalidBasePath {
                path: base_folder.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "base path is not a directory"),
            });
        }

        // History outlives the working directory, so records hold absolute paths.
        let invalid_base = |source| OrganizeError::InvalidBasePath {
            path: base_folder.to_path_buf(),
            source,
        };
        let base_folder = &std::path::absolute(base_folder).map_err(invalid_base)?;
        let file_path = &std::path::absolute(file_path).map_err(invalid_base)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let name = file_name.to_string_lossy();
        let mut category = state.table.classify(&name).to_string();
        let mut category_folder = create_category_folder(base_folder, &category)?;

        let mut first_sighting = None;
        if state.options.detect_duplicates {
            match fingerprint(file_path) {
                Ok(digest) => match state.duplicates.get(&digest) {
                    Some(first) => {
                        debug!(
                            "{} duplicates {} ({})",
                            file_path.display(),
                            first.display(),
                            digest
                        );
                        category = DUPLICATES.to_string();
                        category_folder = create_category_folder(base_folder, DUPLICATES)?;
                    }
                    None => first_sighting = Some(digest),
                },
                Err(e) => warn!(
                    "Could not fingerprint {}, skipping duplicate check: {}",
                    file_path.display(),
                    e
                ),
            }
        }

        let destination = move_into(file_path, &category_folder, &name)?;

        if let Some(digest) = first_sighting {
            state.duplicates.insert(digest, file_path.to_path_buf());
        }

        if state.options.enable_undo {
            let record = MoveRecord::new(file_path.to_path_buf(), destination.clone(), &category);
            if let Err(e) = state.history.append(record) {
                warn!("Move recorded in memory only: {}", e);
            }
        }

        *state.stats.entry(category.clone()).or_insert(0) += 1;
        info!(
            "Organized {} -> {} [{}]",
            file_path.display(),
            destination.display(),
            category
        );

        Ok(Some(destination))
    }

    /// Reverts the most recent recorded move.
    ///
    /// If the moved file has disappeared, its record is dropped. If moving it back
    /// fails, the record is put back so the undo can be retried. A file that has since
    /// appeared at the original location is renamed aside with a timestamp suffix
    /// rather than overwritten.
    pub fn undo_last(&self) -> Result<MoveRecord, UndoError> {
        let mut state = self.state.lock();
        let record = state.history.pop_last().ok_or(UndoError::NothingToUndo)?;

        if !record.destination.exists() {
            persist_quietly(&state.history);
            return Err(UndoError::FileMissing {
                path: record.destination,
            });
        }

        match restore(&record) {
            Ok(()) => {
                persist_quietly(&state.history);
                if record.category != DUPLICATES
                    && let Ok(digest) = fingerprint(&record.source)
                    && state.duplicates.get(&digest) == Some(&record.source)
                {
                    // The file is back where it was first seen; organizing it again is
                    // not a duplicate of itself.
                    state.duplicates.remove(&digest);
                }
                info!(
                    "Undone: {} -> {}",
                    record.destination.display(),
                    record.source.display()
                );
                Ok(record)
            }
            Err(e) => {
                let error = UndoError::RestoreFailed {
                    from: record.destination.clone(),
                    to: record.source.clone(),
                    source: e,
                };
                state.history.push_back(record);
                Err(error)
            }
        }
    }

    /// Organizes every regular file directly inside `folder`.
    ///
    /// Subdirectories are not descended into. A failure on one file is reported to the
    /// observer and the pass continues. Paths currently claimed by the watcher are
    /// left to it. Returns the number of files moved.
    pub fn organize_all_in_folder(
        &self,
        folder: &Path,
        observer: &dyn OrganizeObserver,
    ) -> OrganizeResult<usize> {
        let mut count = 0;

        for path in direct_files(folder)? {
            let Some(_claim) = self.claim(&path) else {
                debug!("Skipping {}: already being processed", path.display());
                continue;
            };

            match self.organize(&path, folder) {
                Ok(Some(destination)) => {
                    count += 1;
                    observer.on_organized(&organized_message(&destination));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("{}", e);
                    observer.on_error(&e.to_string());
                }
            }
        }

        Ok(count)
    }

    /// Lists where each eligible file directly inside `folder` would be filed.
    ///
    /// Nothing is moved or recorded, and the duplicate index is left untouched.
    pub fn plan_folder(&self, folder: &Path) -> OrganizeResult<Vec<PlannedMove>> {
        let files = direct_files(folder)?;
        let state = self.state.lock();

        Ok(files
            .into_iter()
            .filter(|path| self.filters.should_include(path))
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                PlannedMove {
                    category: state.table.classify(&name).to_string(),
                    path,
                }
            })
            .collect())
    }

    /// Marks `path` as in flight. Returns `None` if someone else already holds it.
    ///
    /// The mark is cleared when the returned claim is dropped.
    pub fn claim(&self, path: &Path) -> Option<PathClaim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(path.to_path_buf()) {
            return None;
        }
        Some(PathClaim {
            owner: self,
            path: path.to_path_buf(),
        })
    }

    /// Whether `path` is currently claimed.
    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.lock().contains(path)
    }

    /// Snapshot of files organized per category this session.
    ///
    /// Undo does not decrement these counts.
    pub fn stats(&self) -> BTreeMap<String, u64> {
        self.state.lock().stats.clone()
    }

    /// Snapshot of the recorded moves, oldest first.
    pub fn history(&self) -> Vec<MoveRecord> {
        self.state.lock().history.records().cloned().collect()
    }

    /// Number of moves that can currently be undone.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Replaces the category table. Waits for any organize in progress.
    pub fn set_categories(&self, table: CategoryTable) {
        self.state.lock().table = table;
    }

    /// The duplicate and undo switches currently in effect.
    pub fn options(&self) -> OrganizeOptions {
        self.state.lock().options
    }
}

/// Marker that a path is being processed. Dropping it releases the path.
pub struct PathClaim<'a> {
    owner: &'a FileOrganizer,
    path: PathBuf,
}

impl PathClaim<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.lock().remove(&self.path);
    }
}

/// Message reported to observers for a successful move.
pub fn organized_message(destination: &Path) -> String {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("Organized: {}", name)
}

/// First non-existing path in `folder` for `file_name`: the name itself, then
/// `{base}_1{ext}`, `{base}_2{ext}`, and so on.
pub fn free_destination(folder: &Path, file_name: &str) -> PathBuf {
    let candidate = folder.join(file_name);
    if is_free(&candidate) {
        return candidate;
    }

    let (base_name, extension) = split_file_name(file_name);
    (1u64..)
        .map(|counter| folder.join(format!("{}_{}{}", base_name, counter, extension)))
        .find(|candidate| is_free(candidate))
        .unwrap_or(candidate)
}

// Dangling symlinks occupy a name too, so `exists()` is not enough.
fn is_free(path: &Path) -> bool {
    fs::symlink_metadata(path).is_err()
}

/// Moves `file_path` into `folder` under the first free variant of `name`.
///
/// A name taken between choosing it and moving is skipped, never overwritten.
fn move_into(file_path: &Path, folder: &Path, name: &str) -> OrganizeResult<PathBuf> {
    let mut attempts = 0;
    loop {
        let destination = free_destination(folder, name);
        match move_no_clobber(file_path, &destination) {
            Ok(()) => return Ok(destination),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < MAX_MOVE_ATTEMPTS => {
                debug!("{} was taken meanwhile, picking another name", destination.display());
                attempts += 1;
            }
            Err(e) => {
                return Err(OrganizeError::FileMoveFailure {
                    from: file_path.to_path_buf(),
                    to: destination,
                    source: e,
                });
            }
        }
    }
}

const MAX_MOVE_ATTEMPTS: usize = 16;

/// Moves a file without replacing anything already at `to`.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] if `to` is taken. Uses a hard link
/// where possible and falls back to an exclusive copy (other volumes, file systems
/// without links). On failure the source is left in place and no partial copy remains.
pub fn move_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(e) => {
            debug!("Hard link to {} failed ({}), copying", to.display(), e);
            copy_no_clobber(from, to)?;
        }
    }

    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

fn copy_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = fs::File::open(from)?;
    let mut target = fs::OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = io::copy(&mut source, &mut target)
        .and_then(|_| target.sync_all())
        .and_then(|_| fs::set_permissions(to, source.metadata()?.permissions()));
    if copied.is_err() {
        let _ = fs::remove_file(to);
    }
    copied
}

/// Moves a file, falling back to copy and delete when a rename crosses devices.
///
/// On failure the source is left in place and no partial copy remains.
pub fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Rename across devices, copying {}", from.display());
            if let Err(copy_error) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(copy_error);
            }
            if let Err(remove_error) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(remove_error);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn restore(record: &MoveRecord) -> io::Result<()> {
    if let Some(parent) = record.source.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut backup = None;
    if !is_free(&record.source) {
        let backup_path = backup_path(&record.source);
        warn!(
            "{} is occupied, moving it to {}",
            record.source.display(),
            backup_path.display()
        );
        fs::rename(&record.source, &backup_path)?;
        backup = Some(backup_path);
    }

    let moved = relocate(&record.destination, &record.source);
    if moved.is_err()
        && let Some(backup_path) = backup
        && let Err(e) = fs::rename(&backup_path, &record.source)
    {
        warn!(
            "Could not put {} back to {}: {}",
            backup_path.display(),
            record.source.display(),
            e
        );
    }
    moved
}

/// Generates a backup path for a file by appending a timestamp.
///
/// Example: `file.txt` becomes `file.txt.bak.20251109-143052`
fn backup_path(original_path: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = original_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    original_path.with_file_name(format!("{}.bak.{}", filename, timestamp))
}

fn create_category_folder(base_folder: &Path, category: &str) -> OrganizeResult<PathBuf> {
    let folder = base_folder.join(category);
    fs::create_dir_all(&folder).map_err(|e| OrganizeError::DirectoryCreationFailed {
        path: folder.clone(),
        source: e,
    })?;
    Ok(folder)
}

fn persist_quietly(history: &HistoryLedger) {
    if let Err(e) = history.persist() {
        warn!("{}", e);
    }
}

fn direct_files(folder: &Path) -> OrganizeResult<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).map_err(|e| OrganizeError::DirectoryReadFailed {
        path: folder.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    files.sort();
    Ok(files)
}
