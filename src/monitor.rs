//! Read-only live view over persisted progress
//!
//! [`ProgressMonitor`] only ever reads the progress directory, so it can run
//! in another process while a pull is active, or long after it finished.

use crate::progress::{ChunkStatus, ProgressError, ProgressRecord, ProgressStore};
use crate::StudentNumber;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::time::Duration;

/// Progress of one chunk at snapshot time
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSnapshot {
    /// Chunk id
    pub chunk_id: usize,
    /// First identifier
    pub start: StudentNumber,
    /// Exclusive bound
    pub end: StudentNumber,
    /// Status
    pub status: ChunkStatus,
    /// Identifiers processed
    pub processed: u64,
    /// Identifiers remaining
    pub remaining: u64,
    /// Failed identifiers so far
    pub failed: usize,
    /// Records per second of the chunk's latest run
    pub throughput: Option<f64>,
}

impl ChunkSnapshot {
    fn from_record(record: &ProgressRecord) -> Self {
        Self {
            chunk_id: record.chunk_id(),
            start: record.start(),
            end: record.end(),
            status: record.status(),
            processed: record.processed(),
            remaining: record.remaining(),
            failed: record.failed().len(),
            throughput: record.throughput(),
        }
    }

    /// Estimated seconds until this chunk finishes
    pub fn eta_seconds(&self) -> Option<f64> {
        eta(self.remaining, self.throughput)
    }
}

/// Aggregate progress across every chunk file
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the files were read
    pub taken_at: DateTime<Utc>,
    /// Per-chunk progress, sorted by chunk id
    pub chunks: Vec<ChunkSnapshot>,
    /// Combined records per second of the chunks being walked
    pub throughput: Option<f64>,
}

impl Snapshot {
    /// Aggregate `records`
    pub fn from_records(records: &[ProgressRecord]) -> Self {
        let chunks: Vec<_> = records.iter().map(ChunkSnapshot::from_record).collect();

        // Workers run side by side, so their rates add up
        let rates: Vec<f64> = chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Running)
            .filter_map(|c| c.throughput)
            .collect();
        let throughput = (!rates.is_empty()).then(|| rates.iter().sum::<f64>());

        Self {
            taken_at: Utc::now(),
            chunks,
            throughput,
        }
    }

    /// Identifiers covered by all chunks
    pub fn total(&self) -> u64 {
        self.chunks.iter().map(|c| c.processed + c.remaining).sum()
    }

    /// Identifiers processed
    pub fn processed(&self) -> u64 {
        self.chunks.iter().map(|c| c.processed).sum()
    }

    /// Identifiers remaining
    pub fn remaining(&self) -> u64 {
        self.chunks.iter().map(|c| c.remaining).sum()
    }

    /// Failed identifiers
    pub fn failed(&self) -> usize {
        self.chunks.iter().map(|c| c.failed).sum()
    }

    /// Chunks with the given status
    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Chunks that reached a terminal status
    pub fn count_terminal(&self) -> usize {
        self.chunks.iter().filter(|c| c.status.is_terminal()).count()
    }

    /// Whether there is at least one chunk and all are terminal
    pub fn all_terminal(&self) -> bool {
        !self.chunks.is_empty() && self.chunks.iter().all(|c| c.status.is_terminal())
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 100.0;
        }
        self.processed() as f64 / total as f64 * 100.0
    }

    /// Estimated seconds until every chunk finishes
    pub fn eta_seconds(&self) -> Option<f64> {
        eta(self.remaining(), self.throughput)
    }

    /// Multi-line operator report
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            "PARALLEL STUDENTS RANGE PULL - PROGRESS".to_string(),
            rule.clone(),
        ];

        if self.chunks.is_empty() {
            lines.push("No chunk progress files found.".to_string());
            return lines.join("\n");
        }

        lines.push(format!(
            "Progress: {}/{} ({:.1}%), {} remaining, {} failed",
            self.processed(),
            self.total(),
            self.percentage(),
            self.remaining(),
            self.failed()
        ));
        lines.push(format!(
            "Chunks: {} completed, {} failed, {} running, {} pending",
            self.count(ChunkStatus::Completed),
            self.count(ChunkStatus::Failed),
            self.count(ChunkStatus::Running),
            self.count(ChunkStatus::Pending)
        ));
        if let Some(rate) = self.throughput {
            lines.push(format!("Rate: {rate:.2} students/second"));
        }
        if let Some(eta) = self.eta_seconds().filter(|_| self.remaining() > 0) {
            lines.push(format!("Estimated time remaining: {}", format_time_estimate(eta)));
        }
        lines.push("-".repeat(60));

        for chunk in &self.chunks {
            let mut line = format!(
                "Chunk {:>3} [{}..{}) {:<9} {}/{} processed",
                chunk.chunk_id,
                chunk.start,
                chunk.end,
                chunk.status.as_str(),
                chunk.processed,
                chunk.processed + chunk.remaining
            );
            if chunk.failed > 0 {
                line.push_str(&format!(", {} failed", chunk.failed));
            }
            if chunk.status == ChunkStatus::Running {
                if let Some(eta) = chunk.eta_seconds() {
                    line.push_str(&format!(", ~{} left", format_time_estimate(eta)));
                }
            }
            lines.push(line);
        }

        lines.push(rule);
        lines.join("\n")
    }
}

fn eta(remaining: u64, throughput: Option<f64>) -> Option<f64> {
    let rate = throughput.filter(|rate| *rate > 0.0)?;
    Some(remaining as f64 / rate)
}

/// Human-readable duration from seconds up to weeks
pub fn format_time_estimate(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.0} seconds");
    }
    let minutes = seconds / 60.0;
    if minutes < 60.0 {
        return format!("{minutes:.1} minutes");
    }
    let hours = minutes / 60.0;
    if hours < 24.0 {
        return format!("{hours:.1} hours");
    }
    let days = hours / 24.0;
    if days < 7.0 {
        return format!("{days:.1} days");
    }
    format!("{:.1} weeks", days / 7.0)
}

/// Polls the progress directory without ever writing to it
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    store: ProgressStore,
}

impl ProgressMonitor {
    /// Monitor the records of `store`
    pub fn new(store: ProgressStore) -> Self {
        Self { store }
    }

    /// Read every record once
    pub fn snapshot(&self) -> Result<Snapshot, ProgressError> {
        Ok(Snapshot::from_records(&self.store.list_all()?))
    }

    /// Endless stream of snapshots, the first immediately and then one per
    /// `interval`. Nothing is read until the stream is polled, and every call
    /// starts a new independent stream.
    pub fn poll(&self, interval: Duration) -> impl Stream<Item = Result<Snapshot, ProgressError>> {
        let store = self.store.clone();
        stream::unfold(true, move |first| {
            let store = store.clone();
            async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                let snapshot = store
                    .list_all()
                    .map(|records| Snapshot::from_records(&records));
                Some((snapshot, false))
            }
        })
    }
}
