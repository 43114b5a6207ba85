//! # Client Context
//!
//! The explicit state every operation receives: settings, the session, and the
//! agent bound to the session's service.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eb_core::{is_logged_in, AgentFactory, AgentHandle, AppError, RepoAgent, Result, SessionState};
use secrecy::SecretString;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::session::SessionManager;

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Tunables for fan-out, paging and retries.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Used when the session does not name a service
    pub default_service_url: String,
    /// Followed accounts fetched concurrently per batch
    pub fanout_batch_size: usize,
    pub follow_limit: u32,
    pub page_limit: u32,
    /// Pages followed per collection before giving up on the cursor chain
    pub max_pages: usize,
    /// Budget for one followed account's fetches
    pub follow_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            default_service_url: DEFAULT_SERVICE_URL.to_string(),
            fanout_batch_size: 5,
            follow_limit: 100,
            page_limit: 100,
            max_pages: 10,
            follow_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Holds the agent for one service origin. Created on first use and replaced
/// when asked for a different origin.
pub struct AgentSlot {
    factory: Arc<dyn AgentFactory>,
    current: Mutex<Option<(String, AgentHandle)>>,
}

impl AgentSlot {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
        }
    }

    pub fn get_or_connect(&self, service_url: &str) -> Result<AgentHandle> {
        let origin = service_origin(service_url)?;
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((bound, handle)) = current.as_ref() {
            if *bound == origin {
                return Ok(handle.clone());
            }
            debug!(from = %bound, to = %origin, "service changed, replacing agent");
        }
        let handle = self.factory.connect(service_url)?;
        *current = Some((origin, handle.clone()));
        Ok(handle)
    }

    /// The agent currently bound, if any.
    pub fn current(&self) -> Option<AgentHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, handle)| handle.clone())
    }
}

/// `scheme://authority` of a service URL, lowercased.
pub fn service_origin(service_url: &str) -> Result<String> {
    let invalid = || AppError::Validation(format!("'{service_url}' is not a service URL"));
    let (scheme, rest) = service_url.trim().split_once("://").ok_or_else(invalid)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if scheme.is_empty() || authority.is_empty() {
        return Err(invalid());
    }
    Ok(format!(
        "{}://{}",
        scheme.to_ascii_lowercase(),
        authority.to_ascii_lowercase()
    ))
}

/// State passed to every board, thread, post and reaction operation.
pub struct ClientContext {
    settings: ClientSettings,
    session: SessionManager,
    agents: AgentSlot,
}

impl ClientContext {
    pub fn new(settings: ClientSettings, session: SessionManager, factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            settings,
            session,
            agents: AgentSlot::new(factory),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The logged-in actor id.
    pub fn actor(&self) -> Result<String> {
        let state = self.session.snapshot();
        if !is_logged_in(&state) {
            return Err(AppError::Unauthorized("not logged in".into()));
        }
        state
            .actor_id
            .ok_or_else(|| AppError::Unauthorized("not logged in".into()))
    }

    /// Service of the current session, or the configured default.
    pub fn service_url(&self) -> String {
        self.session
            .snapshot()
            .service_url
            .unwrap_or_else(|| self.settings.default_service_url.clone())
    }

    pub fn agent(&self) -> Result<AgentHandle> {
        self.agents.get_or_connect(&self.service_url())
    }

    pub fn repo(&self) -> Result<Arc<dyn RepoAgent>> {
        Ok(self.agent()?.repo)
    }

    pub async fn login(
        &self,
        service_url: &str,
        identifier: &str,
        password: &SecretString,
    ) -> Result<SessionState> {
        let agent = self.agents.get_or_connect(service_url)?;
        self.session.login(&agent, service_url, identifier, password).await
    }

    /// Resumes the persisted session, if any. `Ok(false)` means the caller
    /// must log in again; an error means the service could not be reached and
    /// the stored session is still in place.
    pub async fn resume(&self) -> Result<bool> {
        let Some(service_url) = self.session.snapshot().service_url else {
            return Ok(false);
        };
        let agent = self.agents.get_or_connect(&service_url)?;
        self.session.resume(&agent, &self.settings.retry).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout(self.agents.current().as_ref()).await
    }
}
