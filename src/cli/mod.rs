//! CLI command implementations

pub mod error;
pub mod pull;
pub mod retry;
pub mod status;

pub use error::CliError;
pub use pull::PullArgs;
pub use retry::RetryFailedArgs;
pub use status::{CleanArgs, MonitorArgs};

use crate::progress::ProgressStore;
use crate::pull::config::MAX_ATTEMPTS;
use crate::pull::Orchestrator;
use crate::retry::RetryPolicy;
use crate::scrape::{RecordScraper, StudentPageScraper};
use crate::session::{FormLoginAuthenticator, SessionConfig, SessionHandle};
use crate::shutdown::SharedShutdown;
use crate::store::SqliteStoreFactory;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the registry base URL
pub const BASE_URL_ENV: &str = "REGISTRY_BASE_URL";

/// Registry pull CLI
#[derive(Parser, Debug)]
#[command(name = "registry-pull")]
#[command(about = "Pull student records from the legacy registry into a local database", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding per-chunk progress files
    #[arg(long, global = true, default_value = ".pull-progress")]
    pub progress_dir: PathBuf,

    /// File the registry session is persisted to between runs
    #[arg(long, global = true, default_value = ".registry-session.json")]
    pub session_file: PathBuf,

    /// SQLite database receiving the student records
    #[arg(long, global = true, default_value = "registry.sqlite3")]
    pub database: PathBuf,

    /// Attempts per identifier before it is recorded as failed (range: 1-1000)
    #[arg(long, global = true, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_attempts: u32,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Base URL of the registry application
    #[arg(long, global = true, env = BASE_URL_ENV)]
    pub base_url: Option<String>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull a range of student numbers in parallel chunks
    Pull(PullArgs),

    /// Show the progress of every chunk once
    Status,

    /// Watch chunk progress until every chunk is finished
    Monitor(MonitorArgs),

    /// Delete all chunk progress files
    Clean(CleanArgs),

    /// Re-pull every identifier recorded as failed
    RetryFailed(RetryFailedArgs),
}

impl Cli {
    /// Progress store rooted at `--progress-dir`
    pub fn progress_store(&self) -> ProgressStore {
        ProgressStore::new(self.progress_dir.clone())
    }

    /// Default retry policy with `--max-attempts`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_attempts)
    }

    /// Wire the session, scraper and database into an orchestrator.
    ///
    /// With `info_only` the program list page is not fetched.
    pub fn build_orchestrator(
        &self,
        info_only: bool,
        shutdown: SharedShutdown,
    ) -> Result<Orchestrator, CliError> {
        let base_url = self.base_url.clone().ok_or_else(|| {
            CliError::ConfigurationError(format!(
                "registry base URL missing: pass --base-url or set {BASE_URL_ENV}"
            ))
        })?;

        let authenticator = FormLoginAuthenticator::from_env()?;
        let session = SessionHandle::new(SessionConfig::new(base_url), Arc::new(authenticator))?
            .with_session_file(self.session_file.clone());

        let scraper: Arc<dyn RecordScraper> = if info_only {
            Arc::new(StudentPageScraper::info_only())
        } else {
            Arc::new(StudentPageScraper::new())
        };
        let stores = SqliteStoreFactory::new(self.database.clone())?;

        Ok(Orchestrator::new(
            Arc::new(session),
            scraper,
            Arc::new(stores),
            self.progress_store(),
        )
        .with_retry_policy(self.retry_policy())
        .with_shutdown(shutdown))
    }
}
