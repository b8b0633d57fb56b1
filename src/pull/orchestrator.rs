//! Schedules chunk workers over a bounded pool

use super::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_WORKERS, MAX_WORKERS_LIMIT};
use super::worker::{escalate, ChunkWorker};
use super::PullError;
use crate::progress::{ChunkStatus, JobLock, ProgressRecord, ProgressStore};
use crate::range::{Chunk, Range};
use crate::retry::{RetryFailure, RetryPolicy};
use crate::scrape::RecordScraper;
use crate::session::SessionHandle;
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::store::StoreFactory;
use crate::StudentNumber;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Options of one pull run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOptions {
    /// Identifiers per chunk
    pub chunk_size: u64,
    /// Chunks pulled concurrently
    pub max_workers: usize,
    /// Clear every chunk's progress before running
    pub reset: bool,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_WORKERS)
    }
}

impl PullOptions {
    /// Options without reset
    pub fn new(chunk_size: u64, max_workers: usize) -> Self {
        Self {
            chunk_size,
            max_workers,
            reset: false,
        }
    }

    /// Enable or disable reset
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Reject zero sizes and oversized pools
    pub fn validate(&self) -> Result<(), PullError> {
        if self.chunk_size == 0 {
            return Err(PullError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS_LIMIT {
            return Err(PullError::InvalidArgument(format!(
                "max workers must be between 1 and {MAX_WORKERS_LIMIT}, got {}",
                self.max_workers
            )));
        }
        Ok(())
    }
}

/// What happened to one chunk during a run
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// Walked to the end during this run
    Finished(ProgressRecord),
    /// Already terminal from an earlier run
    Skipped(ProgressRecord),
    /// Stopped by an unexpected error; resumable
    Aborted {
        /// Chunk id
        chunk_id: usize,
        /// Error description
        error: String,
    },
    /// Stopped by a shutdown request; resumable
    Cancelled {
        /// Chunk id
        chunk_id: usize,
    },
}

impl ChunkOutcome {
    /// Chunk id
    pub fn chunk_id(&self) -> usize {
        match self {
            ChunkOutcome::Finished(record) | ChunkOutcome::Skipped(record) => record.chunk_id(),
            ChunkOutcome::Aborted { chunk_id, .. } | ChunkOutcome::Cancelled { chunk_id } => {
                *chunk_id
            }
        }
    }

    fn terminal_record(&self) -> Option<&ProgressRecord> {
        match self {
            ChunkOutcome::Finished(record) | ChunkOutcome::Skipped(record) => Some(record),
            _ => None,
        }
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Chunks in the range
    pub total_chunks: usize,
    /// Chunks terminal as completed (including skipped ones)
    pub completed: usize,
    /// Chunks terminal with residual failed identifiers (including skipped ones)
    pub failed: usize,
    /// Chunks skipped because an earlier run finished them
    pub skipped: usize,
    /// Chunks stopped by an unexpected error, with the error
    pub aborted: Vec<(usize, String)>,
    /// Chunks stopped by shutdown
    pub cancelled: usize,
    /// Union of failed identifiers over all terminal chunks
    pub failed_ids: BTreeSet<StudentNumber>,
}

impl PullSummary {
    /// Aggregate `outcomes` of a range split into `total_chunks`
    pub fn from_outcomes(total_chunks: usize, outcomes: &[ChunkOutcome]) -> Self {
        let mut summary = PullSummary {
            total_chunks,
            ..Default::default()
        };

        for outcome in outcomes {
            if let Some(record) = outcome.terminal_record() {
                match record.status() {
                    ChunkStatus::Completed => summary.completed += 1,
                    ChunkStatus::Failed => summary.failed += 1,
                    _ => {}
                }
                summary.failed_ids.extend(record.failed().iter().copied());
            }
            match outcome {
                ChunkOutcome::Skipped(_) => summary.skipped += 1,
                ChunkOutcome::Aborted { chunk_id, error } => {
                    summary.aborted.push((*chunk_id, error.clone()))
                }
                ChunkOutcome::Cancelled { .. } => summary.cancelled += 1,
                ChunkOutcome::Finished(_) => {}
            }
        }

        summary.aborted.sort();
        summary
    }

    /// Whether every chunk reached a terminal status
    pub fn is_complete(&self) -> bool {
        self.completed + self.failed == self.total_chunks
    }

    /// Operator-facing report
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "Chunks: {} total, {} completed, {} finished with failures, {} skipped",
                self.total_chunks, self.completed, self.failed, self.skipped
            ),
        ];
        if self.cancelled > 0 {
            lines.push(format!(
                "{} chunks interrupted by shutdown - rerun the same command to resume",
                self.cancelled
            ));
        }
        for (chunk_id, error) in &self.aborted {
            lines.push(format!("Chunk {chunk_id} aborted: {error}"));
        }
        if !self.failed_ids.is_empty() {
            let ids: Vec<String> = self.failed_ids.iter().map(|id| id.to_string()).collect();
            lines.push(format!(
                "{} failed identifiers: {}",
                self.failed_ids.len(),
                ids.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// Outcome of re-pulling an identifier list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepullReport {
    /// Identifiers pulled successfully this time
    pub recovered: Vec<StudentNumber>,
    /// Identifiers that failed again
    pub still_failed: Vec<StudentNumber>,
    /// Whether shutdown stopped the re-pull early
    pub cancelled: bool,
}

/// Runs a range pull over a bounded pool of chunk workers
pub struct Orchestrator {
    session: Arc<SessionHandle>,
    scraper: Arc<dyn RecordScraper>,
    stores: Arc<dyn StoreFactory>,
    progress: ProgressStore,
    retry: RetryPolicy,
    shutdown: SharedShutdown,
}

impl Orchestrator {
    /// Create an orchestrator with the default retry policy
    pub fn new(
        session: Arc<SessionHandle>,
        scraper: Arc<dyn RecordScraper>,
        stores: Arc<dyn StoreFactory>,
        progress: ProgressStore,
    ) -> Self {
        Self {
            session,
            scraper,
            stores,
            progress,
            retry: RetryPolicy::default(),
            shutdown: ShutdownCoordinator::shared(),
        }
    }

    /// Use `retry` for every record
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share `shutdown` with the caller (Ctrl+C handler, monitor)
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Progress store
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Shutdown coordinator of this orchestrator
    pub fn shutdown(&self) -> &SharedShutdown {
        &self.shutdown
    }

    /// Pull `range`, resuming whatever earlier runs left unfinished.
    ///
    /// Only an unrecoverable session failure is returned as an error; chunk
    /// level failures are reported in the summary.
    pub async fn run(&self, range: Range, options: &PullOptions) -> Result<PullSummary, PullError> {
        options.validate()?;
        let chunks = range.split(options.chunk_size)?;

        let mut job_lock = JobLock::open(self.progress.dir())?;
        let _guard = job_lock.try_acquire()?;

        info!(
            range = %range,
            chunks = chunks.len(),
            chunk_size = options.chunk_size,
            max_workers = options.max_workers,
            reset = options.reset,
            "Starting parallel pull"
        );

        if options.reset {
            for chunk in &chunks {
                self.progress.reset(chunk.id())?;
            }
            info!(chunks = chunks.len(), "Progress reset for all chunks");
        }

        let mut outcomes = Vec::with_capacity(chunks.len());
        let mut pending = Vec::new();
        for chunk in &chunks {
            match self.progress.load(chunk.id()) {
                Ok(Some(record)) if record.matches(chunk) && record.is_terminal() => {
                    info!(
                        chunk_id = chunk.id(),
                        status = %record.status(),
                        "Skipping finished chunk"
                    );
                    outcomes.push(ChunkOutcome::Skipped(record));
                }
                _ => pending.push(*chunk),
            }
        }

        let mut fatal: Option<PullError> = None;
        let mut results = stream::iter(pending)
            .map(|chunk| {
                let chunk_id = chunk.id();
                let task = self.spawn_chunk(chunk);
                task.map(move |joined| (chunk_id, joined))
            })
            .buffer_unordered(options.max_workers);

        while let Some((chunk_id, joined)) = results.next().await {
            let outcome = match joined {
                Ok(Ok(record)) => ChunkOutcome::Finished(record),
                Ok(Err(PullError::Cancelled)) => ChunkOutcome::Cancelled { chunk_id },
                Ok(Err(e)) if e.is_fatal_to_run() => {
                    error!(chunk_id, error = %e, "Session cannot be restored, stopping pull");
                    self.shutdown.request_shutdown();
                    let outcome = ChunkOutcome::Aborted {
                        chunk_id,
                        error: e.to_string(),
                    };
                    fatal.get_or_insert(e);
                    outcome
                }
                Ok(Err(e)) => {
                    error!(chunk_id, error = %e, "Chunk aborted, other chunks continue");
                    ChunkOutcome::Aborted {
                        chunk_id,
                        error: e.to_string(),
                    }
                }
                Err(join_error) => {
                    error!(chunk_id, error = %join_error, "Chunk task failed");
                    ChunkOutcome::Aborted {
                        chunk_id,
                        error: PullError::Task(join_error.to_string()).to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let summary = PullSummary::from_outcomes(chunks.len(), &outcomes);
        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            aborted = summary.aborted.len(),
            cancelled = summary.cancelled,
            failed_ids = summary.failed_ids.len(),
            "Parallel pull finished"
        );
        Ok(summary)
    }

    fn spawn_chunk(
        &self,
        chunk: Chunk,
    ) -> tokio::task::JoinHandle<Result<ProgressRecord, PullError>> {
        let stores = self.stores.clone();
        let session = self.session.clone();
        let scraper = self.scraper.clone();
        let progress = self.progress.clone();
        let retry = self.retry.clone();
        let shutdown = self.shutdown.clone();
        let span = info_span!("chunk", chunk_id = chunk.id());

        tokio::spawn(
            async move {
                // Chunks dispatched after a fatal failure or Ctrl+C never open a handle
                if shutdown.is_shutdown_requested() {
                    return Err(PullError::Cancelled);
                }
                // Each worker owns its database handle for the whole chunk
                let store = stores.open()?;
                ChunkWorker::new(session, scraper, progress, retry, store)
                    .with_shutdown(shutdown)
                    .run(&chunk)
                    .await
            }
            .instrument(span),
        )
    }

    /// Union of failed identifiers recorded in the progress directory
    pub fn failed_identifiers(&self) -> Result<BTreeSet<StudentNumber>, PullError> {
        Ok(self
            .progress
            .list_all()?
            .iter()
            .flat_map(|record| record.failed().iter().copied())
            .collect())
    }

    /// Re-pull an identifier list through the same retry policy.
    ///
    /// Progress records are left untouched; the report lists which
    /// identifiers are still unreachable.
    pub async fn repull(&self, ids: &[StudentNumber]) -> Result<RepullReport, PullError> {
        let mut job_lock = JobLock::open(self.progress.dir())?;
        let _guard = job_lock.try_acquire()?;

        let worker = ChunkWorker::new(
            self.session.clone(),
            self.scraper.clone(),
            self.progress.clone(),
            self.retry.clone(),
            self.stores.open()?,
        )
        .with_shutdown(self.shutdown.clone());

        info!(identifiers = ids.len(), "Re-pulling failed identifiers");
        let mut report = RepullReport::default();

        for &std_no in ids {
            if self.shutdown.is_shutdown_requested() {
                report.cancelled = true;
                break;
            }

            match worker.pull_record(std_no).await {
                Ok(()) => report.recovered.push(std_no),
                Err(failure) if failure.is_record_level() => {
                    warn!(std_no, error = %failure, "Identifier still failing");
                    report.still_failed.push(std_no);
                }
                Err(RetryFailure::Cancelled { .. }) => {
                    report.cancelled = true;
                    break;
                }
                Err(failure) => return Err(escalate(failure)),
            }
        }

        info!(
            recovered = report.recovered.len(),
            still_failed = report.still_failed.len(),
            "Re-pull finished"
        );
        Ok(report)
    }
}
