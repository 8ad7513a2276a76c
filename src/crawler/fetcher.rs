//! HTTP page fetcher
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client
//! - Building the `timestamp/<ts>/page/<n>` request URL
//! - Streaming the response body into a staging artifact
//! - Classifying the outcome (records, empty page, transient failure)
//!
//! A fetch performs exactly one attempt; retries live in `crawler::retry`.

use crate::config::SourceConfig;
use crate::crawler::watermark::Record;
use crate::state::Cursor;
use crate::HarvestError;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Bodies shorter than this carry no records (`[]` plus at most nothing)
const EMPTY_BODY_THRESHOLD: usize = 3;

/// How much of an error body to echo into the log
const ERROR_BODY_PREVIEW: usize = 200;

/// A raw page body written to the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// File name inside the staging directory
    pub name: String,
    /// Full path of the staged file
    pub path: PathBuf,
    /// Cursor the page was fetched at
    pub cursor: Cursor,
}

/// A page that returned records
#[derive(Debug)]
pub struct PageData {
    pub records: Vec<Record>,
    pub artifact: StagedArtifact,
    /// Size of the raw body
    pub bytes: u64,
}

/// Result of a single fetch attempt
#[derive(Debug)]
pub enum FetchResult {
    /// Body parsed as a non-empty record array and staged
    Page(PageData),

    /// No records at this cursor; the feed is caught up
    Empty,

    /// Server answered with something other than 200
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Connection refused, timeout, body stream cut off, etc.
    NetworkError {
        /// Error description
        error: String,
    },

    /// 200 with a body that is not a JSON record array
    Malformed {
        /// Parse error description
        error: String,
    },
}

/// What a complete response body contains
#[derive(Debug)]
pub enum BodyKind {
    Empty,
    Records(Vec<Record>),
    Malformed(String),
}

/// Sorts a raw body into empty, records or malformed
///
/// Anything under three bytes, and `[]` surrounded only by whitespace,
/// counts as empty.
pub fn classify_body(body: &[u8]) -> BodyKind {
    if body.len() < EMPTY_BODY_THRESHOLD || String::from_utf8_lossy(body).trim() == "[]" {
        return BodyKind::Empty;
    }

    match serde_json::from_slice::<Vec<Record>>(body) {
        Ok(records) if records.is_empty() => BodyKind::Empty,
        Ok(records) => BodyKind::Records(records),
        Err(e) => BodyKind::Malformed(format!("Body is not a record array: {}", e)),
    }
}

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("tender-harvest/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages of one resource into one staging directory
pub struct PageFetcher {
    client: Client,
    base_url: String,
    resource: String,
    sub_path: String,
    staging_dir: PathBuf,
}

impl PageFetcher {
    pub fn new(client: Client, config: &SourceConfig, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            resource: config.resource.clone(),
            sub_path: config.sub_path.clone(),
            staging_dir: staging_dir.into(),
        }
    }

    /// URL of the page at `cursor`
    ///
    /// `<base>/<resource>/timestamp/<ts><sub-path>/page/<n>`
    pub fn page_url(&self, cursor: &Cursor) -> String {
        format!(
            "{}/{}/timestamp/{}{}/page/{}",
            self.base_url, self.resource, cursor.timestamp, self.sub_path, cursor.page
        )
    }

    /// Fetches the page at `cursor` once
    ///
    /// Network trouble is reported through [`FetchResult`]; only failures to
    /// write the staging artifact come back as `Err`, since those are fatal.
    pub async fn fetch_page(&self, cursor: &Cursor) -> Result<FetchResult, HarvestError> {
        let url = self.page_url(cursor);
        tracing::info!("Requesting {}", cursor);
        tracing::debug!("GET {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(FetchResult::NetworkError {
                    error: describe_error(&e),
                })
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            tracing::warn!("HTTP {} for {}: {}", status.as_u16(), cursor, preview);
            return Ok(FetchResult::HttpError {
                status_code: status.as_u16(),
            });
        }

        let name = cursor.artifact_name(&self.resource);
        let path = self.staging_dir.join(&name);

        let body = match stream_to_file(response, &path).await {
            Ok(body) => body,
            Err(StreamError::Network(e)) => {
                return Ok(FetchResult::NetworkError {
                    error: describe_error(&e),
                })
            }
            Err(StreamError::Io(source)) => {
                return Err(HarvestError::StagingIo {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        tracing::debug!("Handling response for {} ({} bytes)", cursor, body.len());

        match classify_body(&body) {
            BodyKind::Empty => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Could not remove empty page {}: {}", path.display(), e);
                }
                Ok(FetchResult::Empty)
            }
            BodyKind::Records(records) => Ok(FetchResult::Page(PageData {
                records,
                artifact: StagedArtifact {
                    name,
                    path,
                    cursor: cursor.clone(),
                },
                bytes: body.len() as u64,
            })),
            BodyKind::Malformed(error) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Could not remove malformed page {}: {}", path.display(), e);
                }
                Ok(FetchResult::Malformed { error })
            }
        }
    }
}

enum StreamError {
    Network(reqwest::Error),
    Io(std::io::Error),
}

/// Streams the response body to `path`, returning the complete body
///
/// The file is flushed and synced before returning so compression never
/// sees a partially written artifact.
async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<Vec<u8>, StreamError> {
    let file = File::create(path).await.map_err(StreamError::Io)?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StreamError::Network)?;
        writer.write_all(&chunk).await.map_err(StreamError::Io)?;
        body.extend_from_slice(&chunk);
    }

    writer.flush().await.map_err(StreamError::Io)?;
    writer.into_inner().sync_all().await.map_err(StreamError::Io)?;

    Ok(body)
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Request timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}
