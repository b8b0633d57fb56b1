//! Page requests replaying the session cookies

use super::{join_url, SessionState};
use reqwest::header::{HeaderMap, COOKIE, LOCATION};
use reqwest::StatusCode;

/// Page request failures
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PageError {
    /// The registry no longer accepts the session
    #[error("session expired")]
    SessionExpired,

    /// Unexpected HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Request timed out
    #[error("network timeout")]
    Timeout,

    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport error
    #[error("network error: {0}")]
    Network(String),
}

impl PageError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PageError::Status(code) => *code == 429 || (500..600).contains(code),
            PageError::Timeout | PageError::Connect(_) | PageError::Network(_) => true,
            PageError::SessionExpired => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PageError::Timeout
        } else if err.is_connect() {
            PageError::Connect(err.to_string())
        } else {
            PageError::Network(err.to_string())
        }
    }
}

/// HTTP client bound to one established session
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_url: String,
    cookie_header: String,
    login_marker: String,
    generation: u64,
}

impl AuthenticatedClient {
    /// Bind `http` to `state`
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        state: &SessionState,
        login_marker: impl Into<String>,
        generation: u64,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cookie_header: state.cookie_header(),
            login_marker: login_marker.into(),
            generation,
        }
    }

    /// Establishment counter value this client was created with
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Base URL of the registry
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a page body.
    ///
    /// 401/403, a redirect to the login page, or a body that renders the
    /// login form all report [`PageError::SessionExpired`].
    pub async fn get_page(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, PageError> {
        let mut request = self.http.get(join_url(&self.base_url, path)).query(query);
        if !self.cookie_header.is_empty() {
            request = request.header(COOKIE, &self.cookie_header);
        }

        let response = request.send().await.map_err(PageError::from_reqwest)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PageError::SessionExpired);
        }

        if status.is_redirection() {
            return Err(if redirects_to_login(response.headers()) {
                PageError::SessionExpired
            } else {
                PageError::Status(status.as_u16())
            });
        }

        if !status.is_success() {
            return Err(PageError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(PageError::from_reqwest)?;
        if !self.login_marker.is_empty() && body.contains(&self.login_marker) {
            return Err(PageError::SessionExpired);
        }

        Ok(body)
    }
}

/// Whether the `Location` header points back at the login page
pub(crate) fn redirects_to_login(headers: &HeaderMap) -> bool {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(|location| location.to_ascii_lowercase().contains("login"))
        .unwrap_or(false)
}
