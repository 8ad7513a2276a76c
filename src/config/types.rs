use crate::state::DEFAULT_START_TIMESTAMP;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Tender-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
}

/// Where the feed lives
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Scheme, host and port of the API (e.g., "http://10.0.0.5:4000")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// First path segment naming the data set (e.g., "master_tender")
    pub resource: String,

    /// Inserted between the timestamp and `/page/` (e.g., "/source/<name>")
    #[serde(rename = "sub-path", default)]
    pub sub_path: String,

    /// Whole-request timeout; large pages can take minutes to stream
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Local persistence layout
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding checkpoint records
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Artifact directory, relative to `data-dir`
    #[serde(rename = "staging-dir", default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl StorageConfig {
    /// Absolute (or data-dir relative) artifact directory
    pub fn staging_path(&self) -> PathBuf {
        self.data_dir.join(&self.staging_dir)
    }
}

/// Retry behaviour for failed page requests
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per page, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait between attempts (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Artifact compression settings
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    /// xz preset, 0 (fast) to 9 (smallest)
    #[serde(default = "default_level")]
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Crawl starting point
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Used only when no checkpoint exists
    #[serde(rename = "start-timestamp", default = "default_start_timestamp")]
    pub start_timestamp: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_timestamp: default_start_timestamp(),
        }
    }
}

fn default_request_timeout() -> u64 {
    600
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("import")
}

fn default_max_attempts() -> u32 {
    10
}

fn default_delay_ms() -> u64 {
    5000
}

fn default_level() -> u32 {
    9
}

fn default_start_timestamp() -> String {
    DEFAULT_START_TIMESTAMP.to_string()
}
