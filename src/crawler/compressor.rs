//! Background compression of staged pages
//!
//! Each staged artifact is handed to its own blocking task, so compression
//! overlaps with the next fetch. The pipeline owns an artifact from
//! [`CompressionPipeline::submit`] until it is either compressed (staging
//! copy deleted, output listed in `files`) or failed (staging copy kept,
//! original listed in `errors`). Every finished job saves a checkpoint.
//!
//! [`CompletionBarrier`] counts outstanding jobs so the crawl can wait for
//! all of them before it finalizes.
//!
//! Jobs may finish in any order, but the saved cursor only advances over
//! the longest run of submissions that have all finished. A resume record
//! never points past a page that is still being compressed.

use crate::crawler::fetcher::StagedArtifact;
use crate::state::{ArtifactState, CrawlState, Cursor};
use crate::storage::{CheckpointStore, StorageError};
use crate::HarvestError;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use xz2::write::XzEncoder;

/// A streaming byte-to-byte compressor
pub trait Codec: Send + Sync {
    /// Appended to the staged name to form the output name
    fn suffix(&self) -> &str;

    /// Compresses all of `input` into `output`
    fn compress(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()>;
}

/// xz (LZMA2) codec
#[derive(Debug, Clone)]
pub struct XzCodec {
    level: u32,
}

impl XzCodec {
    /// `level` is the xz preset, 0 to 9
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for XzCodec {
    fn default() -> Self {
        Self::new(9)
    }
}

impl Codec for XzCodec {
    fn suffix(&self) -> &str {
        ".xz"
    }

    fn compress(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()> {
        let mut encoder = XzEncoder::new(output, self.level);
        io::copy(input, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    }
}

/// Outstanding-job counter plus a "no more submissions" flag
///
/// [`CompletionBarrier::wait`] resolves once the barrier is closed and the
/// counter is zero, in whatever order jobs finish relative to `close`.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    inner: Mutex<BarrierState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct BarrierState {
    outstanding: usize,
    closed: bool,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job; the job is finished when the guard is dropped
    pub fn enter(self: &Arc<Self>) -> JobGuard {
        self.lock().outstanding += 1;
        JobGuard {
            barrier: Arc::clone(self),
        }
    }

    /// Declares that no more jobs will be registered
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.closed && state.outstanding == 0
    }

    /// Waits until the barrier is closed and every job has finished
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a finish in between is not missed
            notified.as_mut().enable();

            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    fn leave(&self) {
        {
            let mut state = self.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BarrierState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one registered job as finished when dropped
///
/// Dropping also happens while unwinding, so a panicking job cannot hold
/// the barrier open.
#[derive(Debug)]
pub struct JobGuard {
    barrier: Arc<CompletionBarrier>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.barrier.leave();
    }
}

/// Resume cursors of finished jobs, keyed by submission order
#[derive(Debug, Default)]
struct CommitLog {
    /// First submission that has not finished yet
    next: u64,
    finished: BTreeMap<u64, Cursor>,
}

impl CommitLog {
    /// Marks job `seq` finished
    ///
    /// Returns the resume cursor of the newest job in the finished prefix
    /// when that prefix grew.
    fn complete(&mut self, seq: u64, cursor: Cursor) -> Option<Cursor> {
        self.finished.insert(seq, cursor);

        let mut committed = None;
        while let Some(cursor) = self.finished.remove(&self.next) {
            committed = Some(cursor);
            self.next += 1;
        }
        committed
    }
}

/// Everything a job needs, cloned into each blocking task
#[derive(Clone)]
struct JobContext {
    codec: Arc<dyn Codec>,
    store: Arc<dyn CheckpointStore>,
    state: Arc<Mutex<CrawlState>>,
    commits: Arc<Mutex<CommitLog>>,
    failure: Arc<Mutex<Option<StorageError>>>,
}

/// Fire-and-forget compression with a completion barrier
pub struct CompressionPipeline {
    ctx: JobContext,
    barrier: Arc<CompletionBarrier>,
    submitted: AtomicU64,
}

impl CompressionPipeline {
    /// Creates a pipeline that records results into `state` and saves it
    /// through `store`
    pub fn new(
        codec: Arc<dyn Codec>,
        store: Arc<dyn CheckpointStore>,
        state: Arc<Mutex<CrawlState>>,
    ) -> Self {
        Self {
            ctx: JobContext {
                codec,
                store,
                state,
                commits: Arc::new(Mutex::new(CommitLog::default())),
                failure: Arc::new(Mutex::new(None)),
            },
            barrier: Arc::new(CompletionBarrier::new()),
            submitted: AtomicU64::new(0),
        }
    }

    /// Hands `artifact` to a background job
    ///
    /// `resume_cursor` is the cursor the crawl continues from once this
    /// artifact is safe. It is saved when this job and every job submitted
    /// before it have finished.
    pub fn submit(&self, artifact: StagedArtifact, resume_cursor: Cursor) {
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed);
        let guard = self.barrier.enter();
        let ctx = self.ctx.clone();

        tracing::debug!(
            "Queued {} for compression ({} outstanding)",
            artifact.name,
            self.barrier.outstanding()
        );

        // Detached; completion is tracked through the guard
        let _ = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            ctx.run(seq, artifact, resume_cursor)
        });
    }

    /// Jobs submitted and not yet finished
    pub fn outstanding(&self) -> usize {
        self.barrier.outstanding()
    }

    /// Returns the first checkpoint save failure seen by a job, if any
    pub fn take_failure(&self) -> Option<StorageError> {
        self.ctx
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Stops accepting work and waits for every submitted job to finish
    ///
    /// Fails if any job could not save its checkpoint.
    pub async fn await_all_outstanding(&self) -> Result<(), HarvestError> {
        self.barrier.close();
        tracing::info!(
            "Waiting for {} compression job(s) to finish",
            self.barrier.outstanding()
        );
        self.barrier.wait().await;

        match self.take_failure() {
            Some(e) => Err(HarvestError::Storage(e)),
            None => Ok(()),
        }
    }
}

impl JobContext {
    fn run(&self, seq: u64, artifact: StagedArtifact, resume_cursor: Cursor) -> ArtifactState {
        let mut lifecycle = ArtifactState::Staged;
        transition(&mut lifecycle, ArtifactState::Compressing, &artifact.name);

        let output_name = format!("{}{}", artifact.name, self.codec.suffix());
        let output_path = artifact.path.with_file_name(&output_name);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            compress_file(self.codec.as_ref(), &artifact.path, &output_path)
        }))
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "codec panicked")));

        let terminal = match outcome {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(&artifact.path) {
                    tracing::warn!(
                        "Compressed {} but could not remove staging copy: {}",
                        artifact.name,
                        e
                    );
                }
                tracing::info!("{} saved.", output_name);
                ArtifactState::Compressed
            }
            Err(e) => {
                tracing::error!(
                    "Compression of {} (from {}) failed: {}",
                    artifact.name,
                    artifact.cursor,
                    e
                );
                let _ = std::fs::remove_file(&output_path);
                ArtifactState::CompressFailed
            }
        };
        transition(&mut lifecycle, terminal, &artifact.name);

        // Held through the save so records reach disk in commit order
        let mut commits = self.commits.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match terminal {
                ArtifactState::Compressed => state.files.push(output_name),
                _ => state.errors.push(artifact.name.clone()),
            }
            if let Some(cursor) = commits.complete(seq, resume_cursor) {
                state.cursor = cursor;
            }
            state.clone()
        };

        if let Err(e) = self.store.save(&snapshot) {
            tracing::error!(
                "Could not save checkpoint after {} at {}: {}",
                artifact.name,
                snapshot.cursor,
                e
            );
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            failure.get_or_insert(e);
        }
        drop(commits);

        terminal
    }
}

fn transition(current: &mut ArtifactState, next: ArtifactState, name: &str) {
    debug_assert!(
        current.can_transition_to(next),
        "invalid artifact transition {} -> {}",
        current,
        next
    );
    tracing::trace!("{}: {} -> {}", name, current, next);
    *current = next;
}

/// Streams `input` through `codec` into `output`, synced to disk
fn compress_file(codec: &dyn Codec, input: &Path, output: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);

    codec.compress(&mut reader, &mut writer)?;

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}
