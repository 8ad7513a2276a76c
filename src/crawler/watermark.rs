//! Watermark cursor advancement
//!
//! The source has no native continuation token. Instead the crawler keeps a
//! watermark, the largest `modified` value seen, and asks for records at or
//! after it. Records that share the watermark timestamp are fetched again
//! on the next request; that duplication is accepted here.

use crate::state::Cursor;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

/// Fixed-width layout every comparable timestamp is rendered in
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Layouts accepted for timestamps without an offset
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A single record from a page
///
/// Only `modified` matters to the crawler; every other field is opaque
/// and stays in the raw artifact.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub modified: Option<serde_json::Value>,
}

impl Record {
    pub fn modified_str(&self) -> Option<&str> {
        self.modified.as_ref().and_then(|v| v.as_str())
    }
}

/// What to do after a page has been consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Fetch this cursor next
    Next(Cursor),

    /// The feed is caught up for this run
    Exhausted,
}

/// Renders a timestamp with exactly three fractional digits
///
/// Accepts naive ISO-8601 timestamps with any number of fractional digits
/// (including none) and RFC 3339 timestamps with an offset, which are
/// converted to UTC. Extra precision is truncated, not rounded.
///
/// Once normalized, timestamps compare correctly as plain strings.
pub fn normalize_millis(timestamp: &str) -> Option<String> {
    let trimmed = timestamp.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(
            dt.with_timezone(&Utc)
                .naive_utc()
                .format(CANONICAL_FORMAT)
                .to_string(),
        );
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.format(CANONICAL_FORMAT).to_string())
}

/// Largest normalized `modified` value on a page
pub fn max_modified(records: &[Record]) -> Option<String> {
    records
        .iter()
        .filter_map(|record| match record.modified_str() {
            Some(raw) => {
                let normalized = normalize_millis(raw);
                if normalized.is_none() {
                    tracing::warn!("Ignoring unparseable modified timestamp '{}'", raw);
                }
                normalized
            }
            None => {
                tracing::warn!("Ignoring record without a modified timestamp");
                None
            }
        })
        .max()
}

/// Computes the cursor that follows a page
///
/// - An empty page means the feed is exhausted.
/// - If the page moved the watermark forward, continue at page 0 of the
///   new watermark.
/// - Otherwise every record sits at the current timestamp (or carries no
///   usable timestamp), so page through the current timestamp instead.
///
/// The returned timestamp is never later than the largest `modified` value
/// seen so far.
pub fn advance(cursor: &Cursor, records: &[Record]) -> Advance {
    if records.is_empty() {
        return Advance::Exhausted;
    }

    match max_modified(records) {
        Some(watermark) if watermark.as_str() > cursor.timestamp.as_str() => {
            tracing::debug!("Watermark advanced {} -> {}", cursor.timestamp, watermark);
            Advance::Next(Cursor::at(watermark))
        }
        _ => Advance::Next(cursor.next_page()),
    }
}
