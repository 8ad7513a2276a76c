//! Checkpoint records persisted between and during runs

use crate::state::Cursor;
use serde::{Deserialize, Serialize};

/// Progress of one crawl run
///
/// This is the shape of both the resume record and the permanent record
/// written when a run completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlState {
    #[serde(flatten)]
    pub cursor: Cursor,

    /// Compressed artifacts, in completion order
    #[serde(default)]
    pub files: Vec<String>,

    /// Staged artifacts whose compression failed
    #[serde(default)]
    pub errors: Vec<String>,

    /// Timestamp this run started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
}

impl CrawlState {
    /// Fresh state for a run starting at `cursor`
    pub fn starting_at(cursor: Cursor) -> Self {
        let first = Some(cursor.timestamp.clone());
        Self {
            cursor,
            files: Vec::new(),
            errors: Vec::new(),
            first,
        }
    }

    /// Timestamp the run started from
    ///
    /// Older records carry no `first` field; their own cursor is the best
    /// remaining answer.
    pub fn first_timestamp(&self) -> &str {
        self.first.as_deref().unwrap_or(&self.cursor.timestamp)
    }

    /// Pointer that seeds the run after this one
    pub fn next_pointer(&self) -> NextPointer {
        NextPointer {
            first: Some(self.first_timestamp().to_string()),
            timestamp: self.cursor.timestamp.clone(),
        }
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::starting_at(Cursor::default())
    }
}

/// Record left behind by a completed run for the next one to start from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextPointer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    pub timestamp: String,
}
