//! Bounded, persisted history of file moves.
//!
//! Every successful relocation produces a [`MoveRecord`]. The [`HistoryLedger`] keeps
//! the most recent records (oldest dropped first) and writes the whole sequence to a
//! JSON file after each append so undo survives restarts.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default number of records retained.
pub const HISTORY_LIMIT: usize = 100;

/// A single relocation, as recorded for undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Where the file was before it was organized.
    pub source: PathBuf,
    /// Where the file was moved to.
    pub destination: PathBuf,
    /// When the move happened.
    pub timestamp: DateTime<Utc>,
    /// Category the file was filed under.
    pub category: String,
}

impl MoveRecord {
    /// Creates a record stamped with the current time.
    pub fn new(source: PathBuf, destination: PathBuf, category: &str) -> Self {
        Self {
            source,
            destination,
            timestamp: Utc::now(),
            category: category.to_string(),
        }
    }
}

/// Errors reading or writing the history file.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to read history file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write history file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid history file format in {}: {source}", .path.display())]
    InvalidFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Append-only, size-bounded log of moves supporting undo of the newest entry.
#[derive(Debug)]
pub struct HistoryLedger {
    records: VecDeque<MoveRecord>,
    capacity: usize,
    store: Option<PathBuf>,
}

impl HistoryLedger {
    /// A ledger that is never written to disk.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            store: None,
        }
    }

    /// Opens the ledger backed by `path`, loading any records already stored there.
    ///
    /// A missing file yields an empty ledger. If the stored sequence is longer than
    /// `capacity`, only the newest records are kept.
    pub fn open(path: &Path, capacity: usize) -> Result<Self, HistoryError> {
        let mut ledger = Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            store: Some(path.to_path_buf()),
        };

        if !path.exists() {
            return Ok(ledger);
        }

        let json = fs::read_to_string(path).map_err(|e| HistoryError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let records: Vec<MoveRecord> =
            serde_json::from_str(&json).map_err(|e| HistoryError::InvalidFormat {
                path: path.to_path_buf(),
                source: e,
            })?;

        ledger.records = records.into();
        ledger.enforce_bound();
        Ok(ledger)
    }

    /// A ledger at `path` that starts empty, ignoring whatever is stored there.
    ///
    /// The next persist overwrites the file.
    pub fn fresh(path: &Path, capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            store: Some(path.to_path_buf()),
        }
    }

    /// Adds a record at the tail, evicting from the head past the bound, then persists.
    ///
    /// The record stays in memory even if persisting fails.
    pub fn append(&mut self, record: MoveRecord) -> Result<(), HistoryError> {
        self.records.push_back(record);
        self.enforce_bound();
        self.persist()
    }

    /// Removes and returns the newest record, or `None` when the ledger is empty.
    pub fn pop_last(&mut self) -> Option<MoveRecord> {
        self.records.pop_back()
    }

    /// Re-inserts a record at the tail (rollback of a failed undo).
    pub fn push_back(&mut self, record: MoveRecord) {
        self.records.push_back(record);
        self.enforce_bound();
    }

    /// Writes the full bounded sequence to the backing file, if any.
    pub fn persist(&self) -> Result<(), HistoryError> {
        let Some(path) = &self.store else {
            return Ok(());
        };

        let write_failed = |source| HistoryError::WriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let json = serde_json::to_string_pretty(&self.records).map_err(|e| {
            HistoryError::InvalidFormat {
                path: path.clone(),
                source: e,
            }
        })?;

        // Write next to the target and rename so a crash never leaves a truncated file.
        // The temporary name is hidden so a watcher on the same folder skips it.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "history.json".to_string());
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, json).map_err(write_failed)?;
        fs::rename(&temp_path, path).map_err(write_failed)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest record, if any.
    pub fn last(&self) -> Option<&MoveRecord> {
        self.records.back()
    }

    /// Records from oldest to newest.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &MoveRecord> {
        self.records.iter()
    }

    /// Path of the backing file.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn enforce_bound(&mut self) {
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }
}
