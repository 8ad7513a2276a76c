//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Cursor`: the `(timestamp, page)` position in the feed
//! - `CrawlState`: the checkpoint (cursor plus compressed/failed artifact lists)
//! - `NextPointer`: what a finished run leaves for the next one
//! - `ArtifactState`: lifecycle of a single page artifact

mod artifact_state;
mod crawl_state;
mod cursor;

// Re-export main types
pub use artifact_state::ArtifactState;
pub use crawl_state::{CrawlState, NextPointer};
pub use cursor::{timestamp_to_filename, Cursor, DEFAULT_START_TIMESTAMP};
