//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::CrawlState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint record {path}: {source}")]
    CorruptRecord {
        path: String,
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which record `load` will build the crawl state from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointSource {
    /// An interrupted run left a resume record
    Resume(PathBuf),

    /// A completed run left a pointer to continue from
    Next(PathBuf),

    /// Nothing on disk; start from the configured epoch
    Default,
}

/// Trait for checkpoint backend implementations
///
/// Compression jobs save from the blocking pool while the orchestrator
/// keeps fetching, so implementations must be shareable across threads.
/// Every `save` writes the full state; concurrent saves are last-writer-wins.
pub trait CheckpointStore: Send + Sync {
    /// Builds the state a run should start from
    fn load(&self) -> StorageResult<CrawlState>;

    /// Persists the full state to the resume record
    ///
    /// A crash during `save` must leave either the previous or the new
    /// record readable, never a partial one.
    fn save(&self, state: &CrawlState) -> StorageResult<()>;

    /// Rotates a completed run into its permanent record
    ///
    /// Writes the permanent record and the next pointer, then removes the
    /// resume record. Returns the permanent record's path.
    fn finalize(&self, state: &CrawlState) -> StorageResult<PathBuf>;

    /// Reports which record `load` would use, without reading it
    fn describe(&self) -> CheckpointSource;
}
