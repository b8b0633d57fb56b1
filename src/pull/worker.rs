//! Chunk worker: walks one chunk identifier by identifier

use super::PullError;
use crate::metrics::RecordPullMetrics;
use crate::progress::{ProgressError, ProgressRecord, ProgressStore};
use crate::range::Chunk;
use crate::retry::{Classify, FailureClass, RetryFailure, RetryPolicy};
use crate::scrape::{RecordScraper, ScrapeError};
use crate::session::{SessionError, SessionHandle};
use crate::shutdown::SharedShutdown;
use crate::store::{StoreError, StudentStore};
use crate::{StudentNumber, StudentRecord};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Failure of one fetch-and-write attempt
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Scraping failed
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// Writing failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    /// Short failure kind used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Scrape(ScrapeError::Transient(_)) => "transient",
            RecordError::Scrape(ScrapeError::NotFound(_)) => "not_found",
            RecordError::Scrape(ScrapeError::Page(_)) => "page",
            RecordError::Scrape(ScrapeError::Parse(_)) => "parse",
            RecordError::Scrape(ScrapeError::SessionExpired | ScrapeError::Session(_)) => {
                "session"
            }
            RecordError::Store(_) => "store",
        }
    }
}

impl Classify for RecordError {
    fn class(&self) -> FailureClass {
        match self {
            RecordError::Scrape(e) => e.class(),
            RecordError::Store(e) => e.class(),
        }
    }
}

/// Convert a failure that must stop the chunk into the error reported upward
pub(crate) fn escalate(failure: RetryFailure<RecordError>) -> PullError {
    match failure {
        RetryFailure::Cancelled { .. } => PullError::Cancelled,
        RetryFailure::Fatal {
            error: RecordError::Scrape(ScrapeError::Session(e)),
            ..
        } => PullError::Session(e),
        RetryFailure::Fatal {
            error: RecordError::Scrape(ScrapeError::SessionExpired),
            ..
        } => PullError::Session(SessionError::Rejected(
            "registry rejected a freshly established session".to_string(),
        )),
        other => PullError::Task(other.to_string()),
    }
}

/// Pulls one chunk with its own database handle
pub struct ChunkWorker {
    session: Arc<SessionHandle>,
    scraper: Arc<dyn RecordScraper>,
    progress: ProgressStore,
    retry: RetryPolicy,
    store: Mutex<Box<dyn StudentStore>>,
    shutdown: Option<SharedShutdown>,
}

impl ChunkWorker {
    /// Create a worker owning `store`
    pub fn new(
        session: Arc<SessionHandle>,
        scraper: Arc<dyn RecordScraper>,
        progress: ProgressStore,
        retry: RetryPolicy,
        store: Box<dyn StudentStore>,
    ) -> Self {
        Self {
            session,
            scraper,
            progress,
            retry,
            store: Mutex::new(store),
            shutdown: None,
        }
    }

    /// Stop between identifiers (and during backoff) once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.retry = self.retry.with_shutdown(shutdown.clone());
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Walk `chunk` from its persisted cursor to the end.
    ///
    /// Returns the terminal record. On error the record keeps its `running`
    /// status and cursor so the next run resumes it.
    pub async fn run(&self, chunk: &Chunk) -> Result<ProgressRecord, PullError> {
        if self.shutdown_requested() {
            return Err(PullError::Cancelled);
        }

        let mut record = self.load_or_init(chunk)?;
        if record.is_terminal() {
            debug!(chunk_id = chunk.id(), status = %record.status(), "Chunk already finished");
            return Ok(record);
        }

        if record.current() == chunk.start() {
            info!(
                chunk_id = chunk.id(),
                start = chunk.start(),
                end = chunk.end(),
                "Starting chunk"
            );
        } else {
            info!(
                chunk_id = chunk.id(),
                current = record.current(),
                processed = record.processed(),
                "Resuming chunk"
            );
        }
        record.mark_running()?;
        self.progress.save(&record)?;

        for std_no in chunk.ids_from(record.current()) {
            if self.shutdown_requested() {
                info!(
                    chunk_id = chunk.id(),
                    current = std_no,
                    "Shutdown requested - chunk left running for resume"
                );
                return Err(PullError::Cancelled);
            }

            let metrics = RecordPullMetrics::start();
            match self.pull_record(std_no).await {
                Ok(()) => {
                    metrics.record_success();
                    record.record_success(std_no)?;
                }
                Err(failure) if failure.is_record_level() => {
                    metrics.record_failure(failure.error().map_or("unknown", RecordError::kind));
                    warn!(
                        chunk_id = chunk.id(),
                        std_no,
                        attempts = failure.attempts(),
                        error = %failure,
                        "Record failed, continuing with next identifier"
                    );
                    record.record_failure(std_no)?;
                }
                Err(failure) => return Err(escalate(failure)),
            }
            self.progress.save(&record)?;
        }

        let status = record.finish()?;
        self.progress.save(&record)?;
        crate::metrics::record_chunk_finished(status.as_str());

        info!(
            chunk_id = chunk.id(),
            status = %status,
            failed = record.failed().len(),
            "Chunk finished"
        );
        Ok(record)
    }

    /// Pull one identifier through the retry policy: fetch via the shared
    /// session, then upsert into this worker's database handle.
    pub async fn pull_record(
        &self,
        std_no: StudentNumber,
    ) -> Result<(), RetryFailure<RecordError>> {
        let subject = format!("student {std_no}");
        self.retry
            .execute_for(&subject, |_| self.pull_once(std_no))
            .await
    }

    async fn pull_once(&self, std_no: StudentNumber) -> Result<(), RecordError> {
        let record = self.fetch(std_no).await?;

        let mut store = self
            .store
            .lock()
            .map_err(|_| StoreError::Database("database handle poisoned".to_string()))?;
        store.write_or_update(&record)?;
        Ok(())
    }

    async fn fetch(&self, std_no: StudentNumber) -> Result<StudentRecord, ScrapeError> {
        let client = self.session.get_client().await?;
        match self.scraper.fetch(std_no, &client).await {
            Err(ScrapeError::SessionExpired) => {
                let fresh = self.session.refresh(&client).await?;
                self.scraper.fetch(std_no, &fresh).await
            }
            other => other,
        }
    }

    fn load_or_init(&self, chunk: &Chunk) -> Result<ProgressRecord, PullError> {
        match self.progress.load(chunk.id()) {
            Ok(Some(record)) if record.matches(chunk) => Ok(record),
            Ok(Some(stale)) => {
                warn!(
                    chunk_id = chunk.id(),
                    stale_start = stale.start(),
                    stale_end = stale.end(),
                    "Progress record belongs to a different range, starting chunk fresh"
                );
                Ok(ProgressRecord::new(chunk))
            }
            Ok(None) => Ok(ProgressRecord::new(chunk)),
            Err(
                e @ (ProgressError::Deserialization(_)
                | ProgressError::SchemaVersionMismatch { .. }
                | ProgressError::Invalid(_)
                | ProgressError::FileTooLarge { .. }),
            ) => {
                warn!(
                    chunk_id = chunk.id(),
                    error = %e,
                    "Unreadable progress record, starting chunk fresh"
                );
                Ok(ProgressRecord::new(chunk))
            }
            Err(e) => Err(e.into()),
        }
    }
}
