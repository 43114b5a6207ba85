//! # eb-repo-memory
//!
//! In-process implementation of `RepoAgent`, `SessionAgent`, `AgentFactory`
//! and `SessionStore`. Backs integration tests and offline runs.
//! Failures (unavailable repositories, rate limits, latency) can be injected
//! per operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use eb_core::{
    AgentFactory, AgentHandle, AppError, Collection, Follow, RawRecord, RecordPage, RepoAgent, Result,
    SessionAgent, SessionGrant, SessionStore, StrongRef,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Remote calls that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListRecords,
    CreateRecord,
    PutRecord,
    GetFollows,
    Login,
    Resume,
}

struct Account {
    did: String,
    handle: String,
    password: SecretString,
}

type Partition = BTreeMap<String, RawRecord>;

#[derive(Default)]
pub struct MemoryRepository {
    /// Records per (repo, collection), ordered by record key
    records: DashMap<(String, Collection), Partition>,
    follows: DashMap<String, Vec<Follow>>,
    accounts: DashMap<String, Arc<Account>>,
    /// Live refresh tokens and the account they belong to
    refresh_tokens: DashMap<String, String>,
    unavailable: DashSet<String>,
    latency: DashMap<String, Duration>,
    /// Pending injected rate-limit failures per operation
    rate_limits: DashMap<Operation, u32>,
    calls: DashMap<Operation, usize>,
    sequence: AtomicU64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that can log in by handle or did.
    pub fn add_account(&self, did: &str, handle: &str, password: &str) {
        let account = Arc::new(Account {
            did: did.to_string(),
            handle: handle.to_string(),
            password: SecretString::from(password.to_string()),
        });
        self.accounts.insert(did.to_string(), account.clone());
        self.accounts.insert(handle.to_string(), account);
    }

    pub fn follow(&self, actor: &str, subject: &str) {
        self.follows.entry(actor.to_string()).or_default().push(Follow {
            did: subject.to_string(),
            handle: None,
        });
    }

    /// Every read of `repo` (and its follow list) fails with a non-transient error.
    pub fn fail_repo(&self, repo: &str) {
        self.unavailable.insert(repo.to_string());
    }

    /// Reads of `repo` wait `delay` before answering.
    pub fn slow_repo(&self, repo: &str, delay: Duration) {
        self.latency.insert(repo.to_string(), delay);
    }

    /// The next `times` calls of `op` fail with a transient rate-limit error.
    pub fn rate_limit(&self, op: Operation, times: u32) {
        self.rate_limits.insert(op, times);
    }

    /// Invalidates every refresh token issued so far.
    pub fn revoke_sessions(&self) {
        self.refresh_tokens.clear();
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.get(&op).map(|n| *n).unwrap_or_default()
    }

    /// Records of one collection, in key order.
    pub fn records(&self, repo: &str, collection: Collection) -> Vec<RawRecord> {
        self.records
            .get(&(repo.to_string(), collection))
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stores `value` directly, bypassing type checks. Used to plant malformed data.
    pub fn insert_raw(&self, repo: &str, collection: Collection, rkey: &str, value: Value) -> StrongRef {
        self.store(repo, collection, rkey.to_string(), value)
    }

    fn begin(&self, op: Operation) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        let mut pending = self.rate_limits.entry(op).or_default();
        if *pending > 0 {
            *pending -= 1;
            debug!(?op, remaining = *pending, "injected rate limit");
            return Err(AppError::TransientRemote("429 rate limited".into()));
        }
        Ok(())
    }

    async fn reach(&self, repo: &str) -> Result<()> {
        let delay = self.latency.get(repo).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.contains(repo) {
            return Err(AppError::Remote(format!("repository {repo} is unavailable")));
        }
        Ok(())
    }

    fn next_key(&self) -> String {
        format!("{:013}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn store(&self, repo: &str, collection: Collection, rkey: String, value: Value) -> StrongRef {
        let uri = format!("at://{repo}/{}/{rkey}", collection.nsid());
        let cid = content_id(&value);
        let record = RawRecord {
            uri: uri.clone(),
            cid: cid.clone(),
            value,
        };
        self.records
            .entry((repo.to_string(), collection))
            .or_default()
            .insert(rkey, record);
        StrongRef { uri, cid }
    }

    fn issue(&self, account: &Account) -> SessionGrant {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let refresh_token = format!("refresh-{n}");
        self.refresh_tokens.insert(refresh_token.clone(), account.did.clone());
        SessionGrant {
            actor_id: account.did.clone(),
            handle: account.handle.clone(),
            access_token: format!("access-{n}"),
            refresh_token,
        }
    }
}

/// "bafy" followed by the SHA-256 of the record's JSON encoding.
pub fn content_id(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("bafy{}", hex::encode(hasher.finalize()))
}

fn check_type(collection: Collection, record: &Value) -> Result<()> {
    match record.get("$type").and_then(Value::as_str) {
        Some(t) if t == collection.nsid() => Ok(()),
        other => Err(AppError::Validation(format!(
            "record $type {other:?} does not match collection {collection}"
        ))),
    }
}

#[async_trait]
impl RepoAgent for MemoryRepository {
    async fn list_records(
        &self,
        repo: &str,
        collection: Collection,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<RecordPage> {
        self.begin(Operation::ListRecords)?;
        self.reach(repo).await?;

        let Some(partition) = self.records.get(&(repo.to_string(), collection)) else {
            return Ok(RecordPage::default());
        };
        let mut remaining = partition
            .iter()
            .filter(|(rkey, _)| cursor.as_ref().map_or(true, |c| rkey.as_str() > c.as_str()));
        let page: Vec<(&String, &RawRecord)> = remaining.by_ref().take(limit.max(1) as usize).collect();
        let more = remaining.next().is_some();
        Ok(RecordPage {
            cursor: page.last().filter(|_| more).map(|(rkey, _)| (*rkey).clone()),
            records: page.into_iter().map(|(_, record)| record.clone()).collect(),
        })
    }

    async fn create_record(&self, repo: &str, collection: Collection, record: Value) -> Result<StrongRef> {
        self.begin(Operation::CreateRecord)?;
        check_type(collection, &record)?;
        Ok(self.store(repo, collection, self.next_key(), record))
    }

    async fn put_record(&self, repo: &str, collection: Collection, rkey: &str, record: Value) -> Result<StrongRef> {
        self.begin(Operation::PutRecord)?;
        check_type(collection, &record)?;
        if rkey.is_empty() {
            return Err(AppError::Validation("record key must not be empty".into()));
        }
        Ok(self.store(repo, collection, rkey.to_string(), record))
    }

    async fn get_follows(&self, actor: &str, limit: u32) -> Result<Vec<Follow>> {
        self.begin(Operation::GetFollows)?;
        self.reach(actor).await?;
        Ok(self
            .follows
            .get(actor)
            .map(|follows| follows.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SessionAgent for MemoryRepository {
    async fn login(&self, identifier: &str, password: &SecretString) -> Result<SessionGrant> {
        self.begin(Operation::Login)?;
        let account = self
            .accounts
            .get(identifier)
            .map(|a| a.clone())
            .filter(|a| a.password.expose_secret() == password.expose_secret())
            .ok_or_else(|| AppError::Unauthorized("invalid identifier or password".into()))?;
        Ok(self.issue(&account))
    }

    async fn resume(&self, grant: &SessionGrant) -> Result<SessionGrant> {
        self.begin(Operation::Resume)?;
        let (_, did) = self
            .refresh_tokens
            .remove(&grant.refresh_token)
            .ok_or_else(|| AppError::Unauthorized("ExpiredToken".into()))?;
        let account = self
            .accounts
            .get(&did)
            .map(|a| a.clone())
            .ok_or_else(|| AppError::NotFound("account".into(), did))?;
        Ok(self.issue(&account))
    }

    fn forget(&self) {}
}

/// Hands out the same repository for every service URL.
pub struct MemoryAgentFactory {
    repository: Arc<MemoryRepository>,
}

impl MemoryAgentFactory {
    pub fn new(repository: Arc<MemoryRepository>) -> Self {
        Self { repository }
    }
}

impl AgentFactory for MemoryAgentFactory {
    fn connect(&self, _service_url: &str) -> Result<AgentHandle> {
        Ok(AgentHandle::from_shared(self.repository.clone()))
    }
}

/// `SessionStore` over a map.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.entries_mut().insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries_mut().get(key).cloned()
    }

    fn entries_mut(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thread(title: &str) -> Value {
        json!({ "$type": "app.echosky.board.thread", "title": title, "createdAt": "2024-01-01T00:00:00Z" })
    }

    #[tokio::test]
    async fn listing_pages_through_cursor() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.create_record("did:a", Collection::Thread, thread(&format!("t{i}")))
                .await
                .unwrap();
        }

        let first = repo.list_records("did:a", Collection::Thread, 2, None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = repo
            .list_records("did:a", Collection::Thread, 2, first.cursor.clone())
            .await
            .unwrap();
        let third = repo
            .list_records("did:a", Collection::Thread, 2, second.cursor.clone())
            .await
            .unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.cursor.is_none());
        assert_eq!(third.records[0].value["title"], "t4");
    }

    #[tokio::test]
    async fn put_overwrites_and_create_rejects_foreign_type() {
        let repo = MemoryRepository::new();
        let a = repo.put_record("did:a", Collection::Thread, "k", thread("one")).await.unwrap();
        let b = repo.put_record("did:a", Collection::Thread, "k", thread("two")).await.unwrap();
        assert_eq!(a.uri, b.uri);
        assert_ne!(a.cid, b.cid);
        assert_eq!(repo.records("did:a", Collection::Thread).len(), 1);

        let err = repo
            .create_record("did:a", Collection::Post, thread("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn injected_rate_limits_are_transient_and_run_out() {
        let repo = MemoryRepository::new();
        repo.rate_limit(Operation::GetFollows, 1);
        let err = repo.get_follows("did:a", 10).await.unwrap_err();
        assert!(err.is_transient());
        assert!(repo.get_follows("did:a", 10).await.is_ok());
        assert_eq!(repo.calls(Operation::GetFollows), 2);
    }

    #[tokio::test]
    async fn resume_rotates_refresh_tokens() {
        let repo = MemoryRepository::new();
        repo.add_account("did:plc:alice", "alice.test", "pw");

        let bad = repo.login("alice.test", &SecretString::from("nope".to_string())).await;
        assert!(matches!(bad, Err(AppError::Unauthorized(_))));

        let grant = repo.login("alice.test", &SecretString::from("pw".to_string())).await.unwrap();
        assert_eq!(grant.actor_id, "did:plc:alice");
        let rotated = repo.resume(&grant).await.unwrap();
        assert_ne!(rotated.refresh_token, grant.refresh_token);
        assert!(repo.resume(&grant).await.is_err());

        repo.revoke_sessions();
        assert!(repo.resume(&rotated).await.is_err());
    }
}
