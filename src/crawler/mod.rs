//! Crawler module for harvesting the paginated feed
//!
//! This module contains the core crawling logic, including:
//! - HTTP page fetching into staging artifacts
//! - Bounded fixed-delay retry
//! - Watermark cursor advancement
//! - Background compression with a completion barrier
//! - Overall crawl coordination

mod compressor;
mod coordinator;
mod fetcher;
mod retry;
mod watermark;

pub use compressor::{Codec, CompletionBarrier, CompressionPipeline, JobGuard, XzCodec};
pub use coordinator::{run_harvest, CrawlPhase, Harvester, RunReport};
pub use fetcher::{
    build_http_client, classify_body, BodyKind, FetchResult, PageData, PageFetcher,
    StagedArtifact,
};
pub use retry::{AttemptError, RetryError, RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use watermark::{advance, max_modified, normalize_millis, Advance, Record};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete harvest
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the checkpoint (resume record, next pointer, or epoch default)
/// 2. Fetch pages one at a time, retrying transient failures
/// 3. Advance the watermark and compress each page in the background
/// 4. Wait for compression to finish
/// 5. Rotate the checkpoint into a permanent record
pub async fn crawl(config: &Config) -> Result<RunReport, HarvestError> {
    run_harvest(config).await
}
