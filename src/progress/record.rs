//! Per-chunk progress record

use super::ProgressError;
use crate::range::Chunk;
use crate::StudentNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Current progress file schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Lifecycle status of a chunk
///
/// Transitions only pending -> running -> {completed, failed}. Terminal
/// records change again only through an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Not started
    Pending,
    /// Being walked (or interrupted while walked)
    Running,
    /// Walked to the end with no failed identifiers
    Completed,
    /// Walked to the end with residual failed identifiers
    Failed,
}

impl ChunkStatus {
    /// Whether the record is finished
    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }

    /// Lowercase name as persisted
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Running => "running",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable cursor and failures of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    schema_version: String,
    chunk_id: usize,
    start: StudentNumber,
    end: StudentNumber,
    current: StudentNumber,
    failed: BTreeSet<StudentNumber>,
    status: ChunkStatus,
    /// Unix millis of the first transition to running
    started_at: Option<i64>,
    /// Unix millis of the last cursor move
    updated_at: Option<i64>,
    /// Unix millis when the latest run picked the chunk up
    #[serde(default)]
    run_started_at: Option<i64>,
    /// Cursor when the latest run picked the chunk up
    #[serde(default)]
    run_start_cursor: Option<StudentNumber>,
}

impl ProgressRecord {
    /// Fresh pending record for `chunk`
    pub fn new(chunk: &Chunk) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            chunk_id: chunk.id(),
            start: chunk.start(),
            end: chunk.end(),
            current: chunk.start(),
            failed: BTreeSet::new(),
            status: ChunkStatus::Pending,
            started_at: None,
            updated_at: None,
            run_started_at: None,
            run_start_cursor: None,
        }
    }

    /// Schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Chunk id
    pub fn chunk_id(&self) -> usize {
        self.chunk_id
    }

    /// First identifier of the chunk
    pub fn start(&self) -> StudentNumber {
        self.start
    }

    /// Exclusive bound of the chunk
    pub fn end(&self) -> StudentNumber {
        self.end
    }

    /// Next identifier to process (`end` once walked)
    pub fn current(&self) -> StudentNumber {
        self.current
    }

    /// Identifiers that exhausted their retries
    pub fn failed(&self) -> &BTreeSet<StudentNumber> {
        &self.failed
    }

    /// Status
    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    /// Unix millis of the first transition to running
    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    /// Unix millis of the last update
    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    /// The chunk this record tracks
    pub fn chunk(&self) -> Chunk {
        Chunk::new(self.chunk_id, self.start, self.end)
    }

    /// Whether this record tracks exactly `chunk`
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.chunk_id == chunk.id() && self.start == chunk.start() && self.end == chunk.end()
    }

    /// Whether the record is finished
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Identifiers in the chunk
    pub fn total(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    /// Identifiers processed so far (succeeded or failed)
    pub fn processed(&self) -> u64 {
        self.start.abs_diff(self.current)
    }

    /// Identifiers left to process
    pub fn remaining(&self) -> u64 {
        self.current.abs_diff(self.end)
    }

    /// Unix millis when the latest run picked the chunk up
    pub fn run_started_at(&self) -> Option<i64> {
        self.run_started_at
    }

    /// Identifiers processed by the latest run
    pub fn processed_this_run(&self) -> u64 {
        self.run_start_cursor
            .unwrap_or(self.start)
            .abs_diff(self.current)
    }

    /// Records per second of the latest run.
    ///
    /// Time between an interrupted run and its resume is not counted.
    /// Records written before runs were tracked fall back to `started_at`.
    pub fn throughput(&self) -> Option<f64> {
        let started = self.run_started_at.or(self.started_at)?;
        let updated = self.updated_at?;
        let processed = self.processed_this_run();
        let elapsed_secs = (updated - started) as f64 / 1000.0;
        if elapsed_secs <= 0.0 || processed == 0 {
            return None;
        }
        Some(processed as f64 / elapsed_secs)
    }

    /// Move to running and open a new run window. Resuming an interrupted
    /// running record keeps its original start time.
    pub fn mark_running(&mut self) -> Result<(), ProgressError> {
        let now = now_millis();
        match self.status {
            ChunkStatus::Pending => {
                self.status = ChunkStatus::Running;
                self.started_at = Some(now);
            }
            ChunkStatus::Running => {}
            from => return Err(self.transition_error(from, ChunkStatus::Running)),
        }
        self.updated_at = Some(now);
        self.run_started_at = Some(now);
        self.run_start_cursor = Some(self.current);
        Ok(())
    }

    /// Record that `std_no` was pulled and advance past it
    pub fn record_success(&mut self, std_no: StudentNumber) -> Result<(), ProgressError> {
        self.advance(std_no, false)
    }

    /// Record that `std_no` could not be pulled and advance past it anyway
    pub fn record_failure(&mut self, std_no: StudentNumber) -> Result<(), ProgressError> {
        self.advance(std_no, true)
    }

    fn advance(&mut self, std_no: StudentNumber, failed: bool) -> Result<(), ProgressError> {
        if self.status != ChunkStatus::Running {
            return Err(ProgressError::Invalid(format!(
                "chunk {} is {}, cannot advance",
                self.chunk_id, self.status
            )));
        }
        if std_no != self.current || self.current == self.end {
            return Err(ProgressError::Invalid(format!(
                "chunk {} expected identifier {}, got {std_no}",
                self.chunk_id, self.current
            )));
        }

        if failed {
            self.failed.insert(std_no);
        }
        self.current += self.chunk().direction().step();
        self.updated_at = Some(now_millis());
        Ok(())
    }

    /// Move a fully walked record to its terminal status
    pub fn finish(&mut self) -> Result<ChunkStatus, ProgressError> {
        if self.status != ChunkStatus::Running {
            let from = self.status;
            return Err(self.transition_error(from, ChunkStatus::Completed));
        }
        if self.current != self.end {
            return Err(ProgressError::Invalid(format!(
                "chunk {} finished at {} before its end {}",
                self.chunk_id, self.current, self.end
            )));
        }

        self.status = if self.failed.is_empty() {
            ChunkStatus::Completed
        } else {
            ChunkStatus::Failed
        };
        self.updated_at = Some(now_millis());
        Ok(self.status)
    }

    /// Back to the initial pending state, whatever the current status
    pub fn reset(&mut self) {
        self.schema_version = SCHEMA_VERSION.to_string();
        self.current = self.start;
        self.failed.clear();
        self.status = ChunkStatus::Pending;
        self.started_at = None;
        self.updated_at = None;
        self.run_started_at = None;
        self.run_start_cursor = None;
    }

    /// Check schema and structural invariants of a loaded record
    pub fn validate(&self) -> Result<(), ProgressError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ProgressError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }

        let chunk = self.chunk();
        if !chunk.is_valid_cursor(self.current) {
            return Err(ProgressError::Invalid(format!(
                "chunk {} cursor {} outside {}..{}",
                self.chunk_id, self.current, self.start, self.end
            )));
        }

        let walked = Chunk::new(self.chunk_id, self.start, self.current);
        if let Some(stray) = self.failed.iter().find(|id| !walked.contains(**id)) {
            return Err(ProgressError::Invalid(format!(
                "chunk {} lists failed identifier {stray} outside its walked range",
                self.chunk_id
            )));
        }

        match self.status {
            ChunkStatus::Pending if self.current != self.start => Err(ProgressError::Invalid(
                format!("pending chunk {} has a moved cursor", self.chunk_id),
            )),
            status if status.is_terminal() && self.current != self.end => {
                Err(ProgressError::Invalid(format!(
                    "{status} chunk {} stopped at {} before its end {}",
                    self.chunk_id, self.current, self.end
                )))
            }
            ChunkStatus::Completed if !self.failed.is_empty() => Err(ProgressError::Invalid(
                format!("completed chunk {} lists failed identifiers", self.chunk_id),
            )),
            _ => Ok(()),
        }
    }

    fn transition_error(&self, from: ChunkStatus, to: ChunkStatus) -> ProgressError {
        ProgressError::Transition {
            chunk_id: self.chunk_id,
            from,
            to,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
