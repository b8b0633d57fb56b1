//! Username/password login against the registry's login form

use super::client::redirects_to_login;
use super::{join_url, Authenticator, SessionCookie, SessionError, SessionState};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::StatusCode;
use tracing::debug;

/// Environment variable holding the registry username
pub const USERNAME_ENV: &str = "REGISTRY_USERNAME";

/// Environment variable holding the registry password
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

/// Login page of the registry
pub const LOGIN_PATH: &str = "login.php";

/// Posts credentials to the login form and keeps the issued cookies
#[derive(Clone)]
pub struct FormLoginAuthenticator {
    username: String,
    password: String,
    login_path: String,
}

impl std::fmt::Debug for FormLoginAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormLoginAuthenticator")
            .field("username", &self.username)
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl FormLoginAuthenticator {
    /// Authenticator for the given credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    /// Read credentials from `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`
    pub fn from_env() -> Result<Self, SessionError> {
        let username = std::env::var(USERNAME_ENV)
            .map_err(|_| SessionError::MissingCredentials(format!("{USERNAME_ENV} is not set")))?;
        let password = std::env::var(PASSWORD_ENV)
            .map_err(|_| SessionError::MissingCredentials(format!("{PASSWORD_ENV} is not set")))?;
        Ok(Self::new(username, password))
    }

    /// Use a different login page
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }
}

#[async_trait]
impl Authenticator for FormLoginAuthenticator {
    async fn authenticate(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<SessionState, SessionError> {
        let url = join_url(base_url, &self.login_path);
        debug!(url = %url, username = %self.username, "Submitting registry login form");

        let response = http
            .post(&url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("login", "Login"),
            ])
            .send()
            .await
            .map_err(|e| SessionError::Http(format!("Login request failed: {e}")))?;

        let status = response.status();
        let cookies = check_login_response(status, response.headers())?;

        // A successful login redirects; re-rendering the form means the
        // credentials were refused.
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| SessionError::Http(e.to_string()))?;
            if body.contains(super::DEFAULT_LOGIN_MARKER) {
                return Err(SessionError::Rejected(
                    "registry re-displayed the login form".to_string(),
                ));
            }
        }

        Ok(SessionState::new(cookies))
    }
}

/// Session cookies of a login response that was not refused outright.
///
/// The registry issues a session cookie even for refused credentials, so a
/// redirect back to the login page counts as a rejection.
pub fn check_login_response(
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Vec<SessionCookie>, SessionError> {
    if status.is_server_error() {
        return Err(SessionError::Http(format!("Login page returned {status}")));
    }

    if status.is_redirection() && redirects_to_login(headers) {
        return Err(SessionError::Rejected(
            "registry redirected back to the login page".to_string(),
        ));
    }

    let cookies = parse_set_cookies(headers);
    if cookies.is_empty() {
        return Err(SessionError::Rejected(
            "login response carried no session cookie".to_string(),
        ));
    }
    Ok(cookies)
}

/// Cookies from every `Set-Cookie` header, later values for the same name win
pub fn parse_set_cookies(headers: &HeaderMap) -> Vec<SessionCookie> {
    let mut cookies: Vec<SessionCookie> = Vec::new();

    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        let pair = raw.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let cookie = SessionCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
        };
        match cookies.iter_mut().find(|existing| existing.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => cookies.push(cookie),
        }
    }

    cookies
}
