//! The `(timestamp, page)` read position in the source feed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp a crawl starts from when no checkpoint exists
pub const DEFAULT_START_TIMESTAMP: &str = "2015-01-01T00:00:00.000";

/// Identifies where to resume reading the feed
///
/// `page` is only meaningful relative to `timestamp`: it is the offset
/// within the result set the source returns for that timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub timestamp: String,
    pub page: u64,
}

impl Cursor {
    /// Creates a cursor at page 0 of the given timestamp
    pub fn at(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            page: 0,
        }
    }

    /// Same timestamp, next page
    pub fn next_page(&self) -> Self {
        Self {
            timestamp: self.timestamp.clone(),
            page: self.page + 1,
        }
    }

    /// Name of the staged artifact holding this cursor's page
    ///
    /// Format: `<resource>_<stamp>_<page padded to 4 digits>.json`
    pub fn artifact_name(&self, resource: &str) -> String {
        format!(
            "{}_{}_{:04}.json",
            resource,
            timestamp_to_filename(&self.timestamp),
            self.page
        )
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::at(DEFAULT_START_TIMESTAMP)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page {}", self.timestamp, self.page)
    }
}

/// Makes a timestamp safe to embed in a file name
///
/// `/`, `:` and `.` all become `-`.
pub fn timestamp_to_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            '/' | ':' | '.' => '-',
            other => other,
        })
        .collect()
}
