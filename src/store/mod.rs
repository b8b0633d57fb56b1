//! Student database collaborators
//!
//! Workers write through a [`StudentStore`], an idempotent upsert keyed by
//! student number. Each worker opens its own handle from a [`StoreFactory`];
//! handles are never shared between concurrent workers.

pub mod sqlite;

pub use sqlite::{SqliteStore, SqliteStoreFactory};

use crate::retry::{Classify, FailureClass};
use crate::StudentRecord;

/// Database errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another connection holds the database lock
    #[error("database busy: {0}")]
    Busy(String),

    /// Any other database failure
    #[error("database error: {0}")]
    Database(String),

    /// The record failed validation and was not written
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl Classify for StoreError {
    fn class(&self) -> FailureClass {
        match self {
            StoreError::Busy(_) => FailureClass::Transient,
            StoreError::Database(_) | StoreError::InvalidRecord(_) => FailureClass::Permanent,
        }
    }
}

/// Upsert sink for scraped students
pub trait StudentStore: Send {
    /// Insert `record` or update the existing row with the same student number.
    /// Writing the same record twice leaves one row.
    fn write_or_update(&mut self, record: &StudentRecord) -> Result<(), StoreError>;
}

/// Opens one [`StudentStore`] per worker
pub trait StoreFactory: Send + Sync {
    /// Open a fresh handle
    fn open(&self) -> Result<Box<dyn StudentStore>, StoreError>;
}
