//! Storage module for persisting crawl progress
//!
//! This module handles the checkpoint records that make a crawl resumable:
//! - The resume record, rewritten after every compressed page
//! - The permanent record a completed run is rotated into
//! - The next pointer that seeds the following run

mod json;
mod traits;

pub use json::{JsonCheckpointStore, NEXT_FILE, RESUME_FILE};
pub use traits::{CheckpointSource, CheckpointStore, StorageError, StorageResult};

use crate::config::Config;

/// Opens the checkpoint store described by the configuration
pub fn open_store(config: &Config) -> JsonCheckpointStore {
    JsonCheckpointStore::new(
        &config.storage.data_dir,
        config.crawl.start_timestamp.clone(),
    )
}
