//! JSON file checkpoint store
//!
//! This module keeps the checkpoint as human-readable JSON records next to
//! the staging directory.

use crate::crawler::normalize_millis;
use crate::state::{timestamp_to_filename, CrawlState, Cursor, NextPointer};
use crate::storage::traits::{CheckpointSource, CheckpointStore, StorageError, StorageResult};
use serde::de::{DeserializeOwned, Error as _};
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Resume record left by an interrupted run
pub const RESUME_FILE: &str = "package_continue.json";

/// Pointer left by a completed run
pub const NEXT_FILE: &str = "package_next.json";

/// File-backed checkpoint store
pub struct JsonCheckpointStore {
    dir: PathBuf,
    default_start: String,
}

impl JsonCheckpointStore {
    /// Creates a store rooted at `dir`
    ///
    /// `default_start` is the timestamp used when neither a resume record
    /// nor a next pointer exists.
    pub fn new(dir: impl Into<PathBuf>, default_start: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_start: default_start.into(),
        }
    }

    pub fn resume_path(&self) -> PathBuf {
        self.dir.join(RESUME_FILE)
    }

    pub fn next_path(&self) -> PathBuf {
        self.dir.join(NEXT_FILE)
    }

    /// Path of the permanent record for a run that started at `first`
    pub fn permanent_path(&self, first: &str) -> PathBuf {
        self.dir
            .join(format!("package_{}.json", timestamp_to_filename(first)))
    }

    /// Serializes `value` to `path` via a temporary file in the same directory
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> StorageResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

fn read_record<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| StorageError::CorruptRecord {
        path: path.display().to_string(),
        source,
    })
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> StorageResult<CrawlState> {
        match self.describe() {
            CheckpointSource::Resume(path) => {
                let state: CrawlState = read_record(&path)?;
                tracing::info!(
                    "Continue package found, resuming at {} ({} files, {} errors)",
                    state.cursor,
                    state.files.len(),
                    state.errors.len()
                );
                Ok(state)
            }
            CheckpointSource::Next(path) => {
                let pointer: NextPointer = read_record(&path)?;
                // Cursor comparisons are textual, so only normalized stamps may enter
                let timestamp = normalize_millis(&pointer.timestamp).ok_or_else(|| {
                    StorageError::CorruptRecord {
                        path: path.display().to_string(),
                        source: serde_json::Error::custom(format!(
                            "unparseable timestamp {:?}",
                            pointer.timestamp
                        )),
                    }
                })?;
                tracing::info!("Next package found, starting at {}", timestamp);
                Ok(CrawlState::starting_at(Cursor::at(timestamp)))
            }
            CheckpointSource::Default => {
                tracing::info!("No checkpoint found, starting at {}", self.default_start);
                Ok(CrawlState::starting_at(Cursor::at(self.default_start.clone())))
            }
        }
    }

    fn save(&self, state: &CrawlState) -> StorageResult<()> {
        self.write_atomic(&self.resume_path(), state)?;
        tracing::trace!("Checkpoint saved at {}", state.cursor);
        Ok(())
    }

    fn finalize(&self, state: &CrawlState) -> StorageResult<PathBuf> {
        let permanent = self.permanent_path(state.first_timestamp());
        self.write_atomic(&permanent, state)?;
        self.write_atomic(&self.next_path(), &state.next_pointer())?;

        // Removed last: a crash before this point resumes and refinalizes
        match std::fs::remove_file(self.resume_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Package written to {}", permanent.display());
        Ok(permanent)
    }

    fn describe(&self) -> CheckpointSource {
        let resume = self.resume_path();
        if resume.exists() {
            return CheckpointSource::Resume(resume);
        }
        let next = self.next_path();
        if next.exists() {
            return CheckpointSource::Next(next);
        }
        CheckpointSource::Default
    }
}
