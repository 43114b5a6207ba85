//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the services and the binary.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Collection, Follow, RecordPage, StrongRef};
use crate::session::SessionGrant;

/// Record access in user-owned repositories, plus the follow graph used as fan-out source.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RepoAgent: Send + Sync {
    /// One page of `collection` in `repo`, continuing from `cursor`.
    async fn list_records(
        &self,
        repo: &str,
        collection: Collection,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<RecordPage>;

    /// Appends a record under a repository-assigned key.
    async fn create_record(&self, repo: &str, collection: Collection, record: Value) -> Result<StrongRef>;

    /// Writes a record under `rkey`, replacing any previous value.
    async fn put_record(
        &self,
        repo: &str,
        collection: Collection,
        rkey: &str,
        record: Value,
    ) -> Result<StrongRef>;

    /// Accounts `actor` follows, at most `limit` of them.
    async fn get_follows(&self, actor: &str, limit: u32) -> Result<Vec<Follow>>;
}

/// Session creation and renewal against the remote service.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionAgent: Send + Sync {
    async fn login(&self, identifier: &str, password: &SecretString) -> Result<SessionGrant>;

    /// Re-establishes a stored session. Returns the (possibly rotated) grant.
    async fn resume(&self, grant: &SessionGrant) -> Result<SessionGrant>;

    /// Drops any credentials the agent holds.
    fn forget(&self);
}

/// Key-value persistence for the serialized session.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SessionStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Both faces of one connected agent.
#[derive(Clone)]
pub struct AgentHandle {
    pub repo: Arc<dyn RepoAgent>,
    pub session: Arc<dyn SessionAgent>,
}

impl AgentHandle {
    /// Wraps a single value implementing both ports.
    pub fn from_shared<A>(agent: Arc<A>) -> Self
    where
        A: RepoAgent + SessionAgent + 'static,
    {
        Self {
            repo: agent.clone(),
            session: agent,
        }
    }
}

/// Creates agents bound to a service URL.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AgentFactory: Send + Sync {
    fn connect(&self, service_url: &str) -> Result<AgentHandle>;
}
