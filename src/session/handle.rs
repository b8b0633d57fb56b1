//! Single shared session for the whole process

use super::{AuthenticatedClient, Authenticator, SessionConfig, SessionError, SessionState};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Owns the live session and hands the same client to every caller.
///
/// Establishment (loading the persisted artifact or logging in) is serialized
/// behind the write lock; established clients are cloned out under the read
/// lock so requests run concurrently.
pub struct SessionHandle {
    http: reqwest::Client,
    config: SessionConfig,
    authenticator: Arc<dyn Authenticator>,
    session_file: Option<PathBuf>,
    current: RwLock<Option<Arc<AuthenticatedClient>>>,
    establishments: AtomicU64,
}

impl SessionHandle {
    /// Create a handle. Nothing is contacted until the first [`get_client`](Self::get_client).
    pub fn new(
        config: SessionConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            http: config.build_http_client()?,
            config,
            authenticator,
            session_file: None,
            current: RwLock::new(None),
            establishments: AtomicU64::new(0),
        })
    }

    /// Reuse and persist the session through `path`
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// How many sessions this handle has established (loaded or logged in)
    pub fn establishments(&self) -> u64 {
        self.establishments.load(Ordering::SeqCst)
    }

    /// The live client, establishing the session on first use
    pub async fn get_client(&self) -> Result<Arc<AuthenticatedClient>, SessionError> {
        if let Some(client) = self.current.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.current.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let persisted = self.session_file.as_deref().and_then(SessionState::load);
        let state = match persisted {
            Some(state) => {
                info!(
                    established_at = %state.established_at(),
                    "Reusing persisted registry session"
                );
                state
            }
            None => self.login().await?,
        };

        let client = self.install(&mut slot, &state);
        Ok(client)
    }

    /// Re-establish the session after `stale` was rejected.
    ///
    /// Workers that observe the same rejection concurrently share a single
    /// re-authentication: once the generation moved on, the newer client is
    /// returned without logging in again.
    pub async fn refresh(
        &self,
        stale: &AuthenticatedClient,
    ) -> Result<Arc<AuthenticatedClient>, SessionError> {
        let mut slot = self.current.write().await;
        if let Some(client) = slot.as_ref() {
            if client.generation() != stale.generation() {
                return Ok(client.clone());
            }
        }

        warn!(
            generation = stale.generation(),
            "Registry rejected the session, re-authenticating"
        );
        *slot = None;
        let state = self.login().await?;
        Ok(self.install(&mut slot, &state))
    }

    async fn login(&self) -> Result<SessionState, SessionError> {
        let state = self
            .authenticator
            .authenticate(&self.http, &self.config.base_url)
            .await?;

        if let Some(path) = &self.session_file {
            if let Err(e) = state.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to persist session");
            }
        }

        info!(cookies = state.cookies().len(), "Logged in to registry");
        Ok(state)
    }

    fn install(
        &self,
        slot: &mut Option<Arc<AuthenticatedClient>>,
        state: &SessionState,
    ) -> Arc<AuthenticatedClient> {
        let generation = self.establishments.fetch_add(1, Ordering::SeqCst) + 1;
        let client = Arc::new(AuthenticatedClient::new(
            self.http.clone(),
            self.config.base_url.clone(),
            state,
            self.config.login_marker.clone(),
            generation,
        ));
        *slot = Some(client.clone());
        client
    }
}
