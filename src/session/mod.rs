//! Authenticated session shared by every worker
//!
//! The registry is a classic PHP application: logging in yields session
//! cookies, and every page request replays them. [`SessionHandle`] owns the
//! single live session of the process, [`AuthenticatedClient`] issues page
//! requests with it, and an [`Authenticator`] supplies a fresh cookie set on
//! demand.

pub mod client;
pub mod handle;
pub mod login;
pub mod state;

pub use client::{AuthenticatedClient, PageError};
pub use handle::SessionHandle;
pub use login::FormLoginAuthenticator;
pub use state::{SessionCookie, SessionState};

use async_trait::async_trait;
use std::time::Duration;

/// HTTP connect timeout in seconds
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout in seconds
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Body fragment that only the login form contains. A data page that renders
/// it means the session was dropped server side.
pub const DEFAULT_LOGIN_MARKER: &str = "type=\"password\"";

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// HTTP client could not be built or the login request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// The registry refused the credentials or issued no session
    #[error("authentication rejected: {0}")]
    Rejected(String),

    /// Credentials are not configured
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The session artifact could not be written
    #[error("session persistence error: {0}")]
    Persistence(String),
}

/// Supplies a fresh session on demand
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in against `base_url` and return the resulting cookie set
    async fn authenticate(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<SessionState, SessionError>;
}

/// Connection settings for the registry
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the registry application (e.g. `https://registry.example.ac/campus`)
    pub base_url: String,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Body fragment that marks the login form
    pub login_marker: String,
}

impl SessionConfig {
    /// Settings with default timeouts and login marker
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            login_marker: DEFAULT_LOGIN_MARKER.to_string(),
        }
    }

    /// Build the HTTP client used for every request of the process.
    ///
    /// Redirects are not followed so a bounce to the login page stays visible.
    pub fn build_http_client(&self) -> Result<reqwest::Client, SessionError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SessionError::Http(format!("Failed to build HTTP client: {e}")))
    }
}

/// Join a base URL and a page path with exactly one slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
