#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use eb_core::{Collection, StrongRef};
use eb_repo_memory::{MemoryAgentFactory, MemoryRepository, MemorySessionStore};
use eb_services::{ClientContext, ClientSettings, RetryPolicy, SessionManager};
use secrecy::SecretString;
use serde_json::json;

pub const ALICE: &str = "did:plc:alice";
pub const BOB: &str = "did:plc:bob";
pub const CAROL: &str = "did:plc:carol";
pub const SERVICE: &str = "https://pds.test";

pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub store: Arc<MemorySessionStore>,
    pub ctx: ClientContext,
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        default_service_url: SERVICE.to_string(),
        fanout_batch_size: 2,
        page_limit: 2,
        follow_timeout: Duration::from_millis(200),
        retry: RetryPolicy::immediate(3),
        ..ClientSettings::default()
    }
}

/// A context logged in as alice against a fresh in-memory repository.
pub async fn logged_in() -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_account(ALICE, "alice.test", "hunter2");
    let store = Arc::new(MemorySessionStore::new());
    let ctx = context(&repo, &store);
    ctx.login(SERVICE, "alice.test", &password("hunter2"))
        .await
        .expect("login");
    Harness { repo, store, ctx }
}

/// A new context over existing state, as after a restart.
pub fn context(repo: &Arc<MemoryRepository>, store: &Arc<MemorySessionStore>) -> ClientContext {
    ClientContext::new(
        settings(),
        SessionManager::load(store.clone()),
        Arc::new(MemoryAgentFactory::new(repo.clone())),
    )
}

pub fn password(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub fn seed_thread(repo: &MemoryRepository, did: &str, rkey: &str, board: Option<&str>, created_at: &str) -> StrongRef {
    let mut value = json!({
        "$type": Collection::Thread.nsid(),
        "title": format!("thread {rkey}"),
        "createdAt": created_at,
    });
    if let Some(board) = board {
        value["board"] = json!(board);
    }
    repo.insert_raw(did, Collection::Thread, rkey, value)
}

pub fn seed_board(repo: &MemoryRepository, did: &str, board_id: &str) {
    repo.insert_raw(
        did,
        Collection::BoardInfo,
        board_id,
        json!({
            "$type": Collection::BoardInfo.nsid(),
            "boardId": board_id,
            "name": format!("Board {board_id}"),
            "createdAt": "2024-01-01T00:00:00Z",
        }),
    );
}
