//! Parallel range pull orchestration
//!
//! [`Orchestrator`] splits a [`Range`](crate::range::Range) into chunks and
//! runs a bounded number of [`ChunkWorker`]s concurrently. Each worker walks
//! its chunk one identifier at a time, persisting progress after every
//! identifier so an interrupted pull resumes exactly where it stopped.
//!
//! Failure propagation:
//!
//! - a record that exhausts its retries is recorded as failed and skipped
//! - an unexpected chunk error aborts only that chunk (left `running`)
//! - a session that cannot be restored stops the whole run

pub mod config;
pub mod orchestrator;
pub mod worker;

pub use orchestrator::{ChunkOutcome, Orchestrator, PullOptions, PullSummary, RepullReport};
pub use worker::{ChunkWorker, RecordError};

use crate::progress::ProgressError;
use crate::range::RangeError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Pull errors
#[derive(Debug, thiserror::Error)]
pub enum PullError {
    /// The session could not be established or restored; fatal to the run
    #[error("session failure: {0}")]
    Session(#[from] SessionError),

    /// Progress could not be persisted; fatal to the current chunk
    #[error("progress persistence failure: {0}")]
    Persistence(#[from] ProgressError),

    /// A worker database handle could not be opened
    #[error("database failure: {0}")]
    Store(#[from] StoreError),

    /// The range could not be split
    #[error("invalid range: {0}")]
    Range(#[from] RangeError),

    /// Invalid pull options
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A chunk task panicked or was aborted
    #[error("chunk task failed: {0}")]
    Task(String),

    /// Shutdown was requested
    #[error("pull cancelled")]
    Cancelled,
}

impl PullError {
    /// Whether this error stops the whole run rather than one chunk
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, PullError::Session(_))
    }
}
