//! # Session State
//!
//! Authentication state of the current user and its persisted form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Well-known key the persisted session lives under.
pub const SESSION_STORAGE_KEY: &str = "echosky.session.v1";

/// Tokens and identity returned by the remote when a session is created or refreshed.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub actor_id: String,
    pub handle: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGrant")
            .field("actor_id", &self.actor_id)
            .field("handle", &self.handle)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Process-wide authentication state.
///
/// `loaded` is a transient flag and is never persisted; the other five fields
/// use the camelCase names of the stored blob.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "did")]
    pub actor_id: Option<String>,
    pub handle: Option<String>,
    #[serde(rename = "accessJwt")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshJwt")]
    pub refresh_token: Option<String>,
    #[serde(rename = "pdsUrl")]
    pub service_url: Option<String>,
    #[serde(skip)]
    pub loaded: bool,
}

impl SessionState {
    /// Every field cleared, `loaded` set.
    pub fn logged_out() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    pub fn from_grant(grant: SessionGrant, service_url: impl Into<String>) -> Self {
        Self {
            actor_id: Some(grant.actor_id),
            handle: Some(grant.handle),
            access_token: Some(grant.access_token),
            refresh_token: Some(grant.refresh_token),
            service_url: Some(service_url.into()),
            loaded: true,
        }
    }

    /// The grant needed to resume this session, if one is stored.
    pub fn grant(&self) -> Option<SessionGrant> {
        Some(SessionGrant {
            actor_id: self.actor_id.clone()?,
            handle: self.handle.clone().unwrap_or_default(),
            access_token: self.access_token.clone().unwrap_or_default(),
            refresh_token: self.refresh_token.clone()?,
        })
    }

    /// Serialized blob for the session store.
    pub fn to_persisted(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a stored blob; the result is always marked `loaded`.
    pub fn from_persisted(raw: &str) -> Result<Self> {
        let mut state: SessionState = serde_json::from_str(raw)?;
        state.loaded = true;
        Ok(state)
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("SessionState")
            .field("actor_id", &self.actor_id)
            .field("handle", &self.handle)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("service_url", &self.service_url)
            .field("loaded", &self.loaded)
            .finish()
    }
}

/// True iff both the actor id and the access token are present and non-empty.
pub fn is_logged_in(state: &SessionState) -> bool {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    present(&state.actor_id) && present(&state.access_token)
}
