//! # Registry Pull Library
//!
//! Bulk import of student records from a session-authenticated legacy
//! registry web application into a local relational store. Identifier
//! ranges far too large for one sequential pass are split into chunks and
//! pulled by a bounded pool of workers, each of which persists its cursor
//! after every identifier so an interrupted job resumes where it stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use registry_pull::pull::{Orchestrator, PullOptions};
//! use registry_pull::range::Range;
//!
//! # async fn example(orchestrator: Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
//! // Pull 901000001..901000501 in chunks of 100 with 4 concurrent workers
//! let range = Range::new(901_000_001, 901_000_501);
//! let options = PullOptions::new(100, 4);
//!
//! let summary = orchestrator.run(range, &options).await?;
//! println!("{} chunks completed", summary.completed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`range`] - Identifier ranges and their deterministic split into chunks
//! - [`retry`] - Bounded-attempt exponential backoff around one record pull
//! - [`session`] - The single shared authenticated client to the registry
//! - [`progress`] - Durable per-chunk progress records with atomic writes
//! - [`scrape`] - Record scraping capability and the student page scraper
//! - [`store`] - Database capability and the SQLite upsert store
//! - [`pull`] - Chunk workers and the orchestrator that schedules them
//! - [`monitor`] - Read-only live view over persisted progress
//!
//! ## Data Types
//!
//! - [`StudentRecord`] - One scraped student with optional program rows
//! - [`ProgramRecord`] - A program enrolment listed for a student

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Observability metrics
pub mod metrics;

/// Read-only progress monitoring
pub mod monitor;

/// Durable per-chunk progress
pub mod progress;

/// Parallel range pull orchestration
pub mod pull;

/// Identifier ranges and chunking
pub mod range;

/// Retry with exponential backoff
pub mod retry;

/// Record scraping from the legacy registry
pub mod scrape;

/// Authenticated session shared across workers
pub mod session;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Student database collaborators
pub mod store;

/// Student number as used by the legacy registry.
pub type StudentNumber = i64;

/// Student record scraped from the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentRecord {
    /// Student number (primary key in the registry)
    pub std_no: StudentNumber,
    /// Full name
    pub name: String,
    /// National identity or passport number
    pub national_id: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Gender as recorded by the registry
    pub gender: Option<String>,
    /// Marital status
    pub marital_status: Option<String>,
    /// Religion
    pub religion: Option<String>,
    /// Primary contact number
    pub phone1: Option<String>,
    /// Secondary contact number
    pub phone2: Option<String>,
    /// Program enrolments (empty when only the info pages were pulled)
    #[serde(default)]
    pub programs: Vec<ProgramRecord>,
}

impl StudentRecord {
    /// Create a record with only the identifying fields set
    pub fn new(std_no: StudentNumber, name: impl Into<String>) -> Self {
        Self {
            std_no,
            name: name.into(),
            national_id: None,
            date_of_birth: None,
            gender: None,
            marital_status: None,
            religion: None,
            phone1: None,
            phone2: None,
            programs: Vec::new(),
        }
    }

    /// Validate record integrity before it is written
    pub fn validate(&self) -> Result<(), String> {
        if self.std_no <= 0 {
            return Err(format!(
                "Student number must be positive, got {}",
                self.std_no
            ));
        }

        if self.name.trim().is_empty() {
            return Err(format!("Student {} has an empty name", self.std_no));
        }

        for program in &self.programs {
            program
                .validate()
                .map_err(|e| format!("Student {}: {e}", self.std_no))?;
        }

        Ok(())
    }
}

/// Program enrolment row listed on a student's program page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramRecord {
    /// Registry id of the student program
    pub id: i64,
    /// Program name
    pub name: String,
    /// Structure version code (e.g. "2019-BSc")
    pub version: String,
    /// Enrolment status (e.g. "Active", "Completed")
    pub status: String,
}

impl ProgramRecord {
    /// Validate program row integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.id <= 0 {
            return Err(format!("Program id must be positive, got {}", self.id));
        }

        if self.name.trim().is_empty() {
            return Err(format!("Program {} has an empty name", self.id));
        }

        Ok(())
    }
}
