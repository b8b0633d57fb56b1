//! Durable per-chunk progress
//!
//! Every chunk owns one JSON file, `students_range_chunk_<id>_progress.json`,
//! inside the progress directory. Files are replaced atomically after every
//! processed identifier, so readers never observe torn data and a rerun of the
//! same range and chunk size finds the same files again.

pub mod atomic;
pub mod lock;
pub mod record;
pub mod store;

pub use lock::JobLock;
pub use record::{ChunkStatus, ProgressRecord, SCHEMA_VERSION};
pub use store::ProgressStore;

/// Progress persistence errors
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Progress file too large
    #[error("progress file too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Record violates its invariants
    #[error("invalid progress record: {0}")]
    Invalid(String),

    /// Illegal status transition
    #[error("chunk {chunk_id}: illegal status transition {from} -> {to}")]
    Transition {
        /// Chunk id
        chunk_id: usize,
        /// Current status
        from: ChunkStatus,
        /// Requested status
        to: ChunkStatus,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),
}
