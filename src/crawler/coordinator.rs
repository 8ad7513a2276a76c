//! Crawl coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the harvesting process, including:
//! - Loading the checkpoint and preparing the staging directory
//! - Fetching one page at a time through the retry policy
//! - Advancing the watermark cursor
//! - Handing staged pages to the compression pipeline
//! - Draining compression and finalizing the run

use crate::config::Config;
use crate::crawler::compressor::{Codec, CompressionPipeline, XzCodec};
use crate::crawler::fetcher::{build_http_client, FetchResult, PageData, PageFetcher};
use crate::crawler::retry::{AttemptError, RetryError, RetryPolicy};
use crate::crawler::watermark::{advance, Advance};
use crate::state::{CrawlState, Cursor};
use crate::storage::{open_store, CheckpointStore};
use crate::HarvestError;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Where the crawl state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Init,
    Fetching,
    Draining,
    Finalizing,
    Done,
    Failed,
}

impl CrawlPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::Draining => "draining",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub phase: CrawlPhase,
    /// Pages that returned records during this run
    pub pages: u64,
    /// Cursor the next run starts from
    pub final_cursor: Cursor,
    pub files: Vec<String>,
    pub errors: Vec<String>,
    /// Permanent record the run was rotated into
    pub record: PathBuf,
}

/// Main harvester structure
pub struct Harvester {
    fetcher: PageFetcher,
    retry: RetryPolicy,
    store: Arc<dyn CheckpointStore>,
    codec: Arc<dyn Codec>,
    staging_dir: PathBuf,
    phase: CrawlPhase,
}

impl Harvester {
    /// Creates a harvester with the JSON checkpoint store and xz codec
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let store: Arc<dyn CheckpointStore> = Arc::new(open_store(config));
        let codec: Arc<dyn Codec> = Arc::new(XzCodec::new(config.compression.level));
        Self::with_collaborators(config, store, codec)
    }

    /// Creates a harvester with a caller-supplied store and codec
    pub fn with_collaborators(
        config: &Config,
        store: Arc<dyn CheckpointStore>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.source)?;
        let staging_dir = config.storage.staging_path();

        Ok(Self {
            fetcher: PageFetcher::new(client, &config.source, staging_dir.clone()),
            retry: RetryPolicy::from_config(&config.retry),
            store,
            codec,
            staging_dir,
            phase: CrawlPhase::Init,
        })
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    fn enter(&mut self, phase: CrawlPhase) {
        tracing::debug!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Runs the crawl until the feed is exhausted or a page gives up
    ///
    /// On failure the resume record is left as the last finished
    /// compression job wrote it, so the next invocation resumes there.
    pub async fn run(&mut self) -> Result<RunReport, HarvestError> {
        match self.drive().await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.enter(CrawlPhase::Failed);
                tracing::error!("Crawl failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<RunReport, HarvestError> {
        // ===== Init =====
        self.enter(CrawlPhase::Init);
        let initial = self.store.load()?;
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|source| HarvestError::StagingIo {
                path: self.staging_dir.display().to_string(),
                source,
            })?;

        let mut cursor = initial.cursor.clone();
        let state = Arc::new(Mutex::new(initial));
        let pipeline =
            CompressionPipeline::new(self.codec.clone(), self.store.clone(), state.clone());

        tracing::info!("Starting crawl at {}", cursor);

        // ===== Fetching =====
        self.enter(CrawlPhase::Fetching);
        let mut pages = 0u64;
        let start_time = std::time::Instant::now();

        loop {
            if let Some(e) = pipeline.take_failure() {
                // Nothing new is submitted; let running jobs settle first
                if let Err(drain_err) = pipeline.await_all_outstanding().await {
                    tracing::error!("While stopping: {}", drain_err);
                }
                return Err(e.into());
            }

            let page = match self.fetch_with_retry(&cursor).await {
                Ok(Some(page)) => page,
                Ok(None) => {
                    tracing::info!("No more records at {}", cursor);
                    break;
                }
                Err(e) => {
                    if let Err(drain_err) = pipeline.await_all_outstanding().await {
                        tracing::error!("While stopping: {}", drain_err);
                    }
                    return Err(e);
                }
            };

            pages += 1;
            let PageData {
                records,
                artifact,
                bytes,
            } = page;

            let next = match advance(&cursor, &records) {
                Advance::Next(next) => next,
                // Fetcher never returns a record-less page
                Advance::Exhausted => break,
            };

            tracing::debug!(
                "{}: {} records, {} bytes, next {}",
                artifact.name,
                records.len(),
                bytes,
                next
            );
            pipeline.submit(artifact, next.clone());
            cursor = next;

            if pages % 10 == 0 {
                tracing::info!(
                    "Progress: {} pages in {:.1?}, {} compressing",
                    pages,
                    start_time.elapsed(),
                    pipeline.outstanding()
                );
            }
        }

        // ===== Draining =====
        self.enter(CrawlPhase::Draining);
        pipeline.await_all_outstanding().await?;

        // ===== Finalizing =====
        self.enter(CrawlPhase::Finalizing);
        let final_state: CrawlState = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.cursor = cursor.clone();
            state.clone()
        };
        let record = self.store.finalize(&final_state)?;

        self.enter(CrawlPhase::Done);
        tracing::info!(
            "done. {} pages, {} files, {} errors, next run starts at {}",
            pages,
            final_state.files.len(),
            final_state.errors.len(),
            final_state.cursor.timestamp
        );

        Ok(RunReport {
            phase: self.phase,
            pages,
            final_cursor: final_state.cursor,
            files: final_state.files,
            errors: final_state.errors,
            record,
        })
    }

    /// Fetches the page at `cursor`, retrying transient failures
    ///
    /// Returns `None` when the page is empty.
    async fn fetch_with_retry(&self, cursor: &Cursor) -> Result<Option<PageData>, HarvestError> {
        let fetcher = &self.fetcher;
        let label = format!("Page {}", cursor);

        let result = self
            .retry
            .run(&label, move |attempt| async move {
                tracing::debug!("Attempt {} for {}", attempt, cursor);
                match fetcher.fetch_page(cursor).await {
                    Ok(FetchResult::Page(page)) => Ok(Some(page)),
                    Ok(FetchResult::Empty) => Ok(None),
                    Ok(FetchResult::HttpError { status_code }) => {
                        Err(AttemptError::Transient(format!("HTTP {}", status_code)))
                    }
                    Ok(FetchResult::NetworkError { error }) => Err(AttemptError::Transient(error)),
                    Ok(FetchResult::Malformed { error }) => Err(AttemptError::Transient(error)),
                    Err(e) => Err(AttemptError::Fatal(e)),
                }
            })
            .await;

        match result {
            Ok(page) => Ok(page),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => Err(HarvestError::RetriesExhausted {
                cursor: cursor.clone(),
                attempts,
                last_error,
            }),
        }
    }
}

/// Runs a complete harvest with the default collaborators
///
/// # Example
///
/// ```no_run
/// use tender_harvest::config::load_config;
/// use tender_harvest::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let report = run_harvest(&config).await?;
/// println!("{} new files", report.files.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: &Config) -> Result<RunReport, HarvestError> {
    let mut harvester = Harvester::new(config)?;
    harvester.run().await
}
