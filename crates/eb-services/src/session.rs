//! # Session Manager
//!
//! Single-writer owner of the [`SessionState`]. Readers get complete snapshots
//! from a watch channel; every transition is written back to the store.

use std::sync::Arc;

use eb_core::{AgentHandle, AppError, Result, SessionState, SessionStore, SESSION_STORAGE_KEY};
use secrecy::SecretString;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::retry::{retry_transient, RetryPolicy};

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    state: watch::Sender<SessionState>,
    writer: Mutex<()>,
}

impl SessionManager {
    /// Restores the persisted session. Missing, unreadable or corrupt data
    /// yields a logged-out state; either way the result is marked `loaded`.
    pub fn load(store: Arc<dyn SessionStore>) -> Self {
        let state = match store.load(SESSION_STORAGE_KEY) {
            Ok(Some(raw)) => SessionState::from_persisted(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "discarding corrupt persisted session");
                SessionState::logged_out()
            }),
            Ok(None) => SessionState::logged_out(),
            Err(err) => {
                warn!(error = %err, "session store unreadable, starting logged out");
                SessionState::logged_out()
            }
        };
        let (state, _) = watch::channel(state);
        Self {
            store,
            state,
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receives every future transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        eb_core::is_logged_in(&self.state.borrow())
    }

    pub async fn login(
        &self,
        agent: &AgentHandle,
        service_url: &str,
        identifier: &str,
        password: &SecretString,
    ) -> Result<SessionState> {
        let _writer = self.writer.lock().await;
        let grant = agent.session.login(identifier, password).await?;
        let next = SessionState::from_grant(grant, service_url);
        self.commit(next.clone())?;
        info!(actor = ?next.actor_id, handle = ?next.handle, service = service_url, "logged in");
        Ok(next)
    }

    /// Hands the stored grant to `agent`, retrying transient failures under
    /// `retry`. Rotated tokens are persisted.
    ///
    /// `Ok(false)` when nothing is stored or the remote rejects the session.
    /// A failure that outlasts the retries is returned as the error; the stored
    /// session is kept either way.
    pub async fn resume(&self, agent: &AgentHandle, retry: &RetryPolicy) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot();
        let (Some(grant), Some(service_url)) = (current.grant(), current.service_url.clone()) else {
            return Ok(false);
        };
        match retry_transient(retry, "resume_session", || agent.session.resume(&grant)).await {
            Ok(renewed) => {
                if renewed != grant {
                    self.commit(SessionState::from_grant(renewed, service_url))?;
                    debug!("session tokens rotated");
                }
                Ok(true)
            }
            Err(err @ (AppError::Unauthorized(_) | AppError::NotFound(..))) => {
                warn!(error = %err, "stored session was rejected");
                Ok(false)
            }
            Err(err) => {
                warn!(error = %err, transient = err.is_transient(), "could not refresh stored session");
                Err(err)
            }
        }
    }

    /// Clears every field but `loaded`, and the agent's credentials.
    pub async fn logout(&self, agent: Option<&AgentHandle>) -> Result<()> {
        let _writer = self.writer.lock().await;
        if let Some(agent) = agent {
            agent.session.forget();
        }
        self.commit(SessionState::logged_out())?;
        info!("logged out");
        Ok(())
    }

    /// Persists `next`, then publishes it. A failed save leaves readers on
    /// the previous state.
    fn commit(&self, next: SessionState) -> Result<()> {
        let raw = next.to_persisted()?;
        self.store.save(SESSION_STORAGE_KEY, &raw)?;
        self.state.send_replace(next);
        Ok(())
    }
}
