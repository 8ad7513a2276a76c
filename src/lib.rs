//! Tender-Harvest: a resumable harvester for paginated tender feeds
//!
//! This crate walks a `timestamp/<ts>/page/<n>` REST feed page by page,
//! stores every page as an xz-compressed JSON artifact and checkpoints its
//! cursor after every page so an interrupted run picks up where it stopped.

pub mod config;
pub mod crawler;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Tender-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error on {path}: {source}")]
    StagingIo {
        path: String,
        source: std::io::Error,
    },

    #[error("Giving up on {cursor} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        cursor: state::Cursor,
        attempts: u32,
        last_error: String,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Tender-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlPhase, Harvester, RunReport};
pub use state::{ArtifactState, CrawlState, Cursor, NextPointer};
pub use storage::{CheckpointStore, JsonCheckpointStore};
