//! Record scraping from the legacy registry
//!
//! A [`RecordScraper`] turns one student number into a [`StudentRecord`]
//! using an authenticated client. [`StudentPageScraper`] reads the personal
//! and academic detail pages and, unless only basic info is requested, the
//! student's program list.

pub mod parse;

use crate::retry::{Classify, FailureClass};
use crate::session::{AuthenticatedClient, PageError, SessionError};
use crate::{StudentNumber, StudentRecord};
use async_trait::async_trait;
use tracing::debug;

/// Personal details page (birthdate, sex, marital status, religion)
pub const PERSONAL_PAGE: &str = "r_stdpersonalview.php";

/// Academic details page (id, name, national id, contact numbers)
pub const ACADEMIC_PAGE: &str = "r_studentviewview.php";

/// Program enrolment list page
pub const PROGRAM_LIST_PAGE: &str = "r_stdprogramlist.php";

/// Scrape errors
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The registry no longer accepts the session
    #[error("session expired")]
    SessionExpired,

    /// Network or server hiccup
    #[error("transient failure: {0}")]
    Transient(String),

    /// No student with this number exists
    #[error("student {0} not found")]
    NotFound(StudentNumber),

    /// Non-retryable HTTP outcome
    #[error("page error: {0}")]
    Page(String),

    /// Page content could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// The session could not be established or restored
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<PageError> for ScrapeError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::SessionExpired => ScrapeError::SessionExpired,
            e if e.is_transient() => ScrapeError::Transient(e.to_string()),
            e => ScrapeError::Page(e.to_string()),
        }
    }
}

impl Classify for ScrapeError {
    fn class(&self) -> FailureClass {
        match self {
            ScrapeError::Transient(_) => FailureClass::Transient,
            ScrapeError::NotFound(_) | ScrapeError::Page(_) | ScrapeError::Parse(_) => {
                FailureClass::Permanent
            }
            ScrapeError::SessionExpired | ScrapeError::Session(_) => FailureClass::Fatal,
        }
    }
}

/// Fetches one student record through an authenticated client
#[async_trait]
pub trait RecordScraper: Send + Sync {
    /// Scrape `std_no`
    async fn fetch(
        &self,
        std_no: StudentNumber,
        client: &AuthenticatedClient,
    ) -> Result<StudentRecord, ScrapeError>;
}

/// Scraper for the registry's student detail pages
#[derive(Debug, Clone, Copy)]
pub struct StudentPageScraper {
    include_programs: bool,
}

impl StudentPageScraper {
    /// Scrape info pages and the program list
    pub fn new() -> Self {
        Self {
            include_programs: true,
        }
    }

    /// Scrape only the info pages (skip the program list)
    pub fn info_only() -> Self {
        Self {
            include_programs: false,
        }
    }

    /// Whether the program list is fetched
    pub fn includes_programs(&self) -> bool {
        self.include_programs
    }
}

impl Default for StudentPageScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordScraper for StudentPageScraper {
    async fn fetch(
        &self,
        std_no: StudentNumber,
        client: &AuthenticatedClient,
    ) -> Result<StudentRecord, ScrapeError> {
        let query = [("StudentID", std_no.to_string())];

        let personal = client.get_page(PERSONAL_PAGE, &query).await?;
        let academic = client.get_page(ACADEMIC_PAGE, &query).await?;
        let mut record = parse::parse_student(std_no, &personal, &academic)?;

        if self.include_programs {
            let list_query = [
                ("showmaster", "1".to_string()),
                ("StudentID", std_no.to_string()),
            ];
            let list = client.get_page(PROGRAM_LIST_PAGE, &list_query).await?;
            record.programs = parse::parse_programs(&list)?;
        }

        record.validate().map_err(ScrapeError::Parse)?;
        debug!(std_no, programs = record.programs.len(), "Scraped student");
        Ok(record)
    }
}
