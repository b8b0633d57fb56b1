//! Persisted session cookies

use super::SessionError;
use crate::progress::atomic::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One cookie issued by the registry at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name (e.g. `PHPSESSID`)
    pub name: String,
    /// Cookie value
    pub value: String,
}

/// Cookie set of an established session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    cookies: Vec<SessionCookie>,
    established_at: DateTime<Utc>,
}

impl SessionState {
    /// Session established now with `cookies`
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self {
            cookies,
            established_at: Utc::now(),
        }
    }

    /// Cookies to replay
    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    /// When the registry issued the session
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// `Cookie` request header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Load a persisted session. Absent or unreadable artifacts yield `None`
    /// so the caller simply logs in again.
    pub fn load(path: &Path) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Cannot read session file");
                }
                return None;
            }
        };

        match serde_json::from_str::<SessionState>(&contents) {
            Ok(state) if !state.cookies.is_empty() => {
                debug!(path = %path.display(), "Loaded persisted session");
                Some(state)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    /// Atomically persist the session
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| SessionError::Persistence(e.to_string()))?;
        write_atomic(path, &json).map_err(|e| {
            SessionError::Persistence(format!("Failed to write {}: {e}", path.display()))
        })
    }
}
