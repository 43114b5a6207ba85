//! # Threads
//!
//! Listing merges the caller's thread records with those of followed accounts;
//! creation always writes to the caller's own repository.

use std::collections::HashSet;

use chrono::Utc;
use eb_core::validation::{validate_board_id, validate_thread_title};
use eb_core::{BoardId, Collection, Listed, RecordSchema, Result, StrongRef, ThreadRecord};
use tracing::info;

use crate::context::ClientContext;
use crate::fanout::{collect_from_follows, AggregationScope};
use crate::records::fetch_all;
use crate::retry::retry_transient;

#[derive(Debug, Clone)]
pub struct NewThread {
    pub title: String,
    pub board: Option<BoardId>,
}

/// Threads newest first, optionally restricted to one board.
pub async fn list_threads(
    ctx: &ClientContext,
    board: Option<&str>,
    scope: AggregationScope,
) -> Result<Vec<Listed<ThreadRecord>>> {
    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let settings = ctx.settings();

    let mut batches = vec![fetch_all::<ThreadRecord>(agent.as_ref(), &actor, settings).await?];
    if scope.includes_follows() {
        batches.extend(
            collect_from_follows(ctx, &agent, &actor, |follow| {
                let agent = agent.clone();
                async move { fetch_all::<ThreadRecord>(agent.as_ref(), &follow.did, settings).await }
            })
            .await,
        );
    }

    let mut seen = HashSet::new();
    let mut threads: Vec<Listed<ThreadRecord>> = batches
        .into_iter()
        .flatten()
        .filter(|thread| board.map_or(true, |b| thread.value.board.as_deref() == Some(b)))
        .filter(|thread| seen.insert(thread.uri.clone()))
        .collect();
    sort_newest_first(&mut threads);

    info!(actor = %actor, ?scope, ?board, threads = threads.len(), "listed threads");
    Ok(threads)
}

/// Ascending by (created_at, uri), then reversed: newest first, and on equal
/// timestamps the lexicographically greater URI first.
pub fn sort_newest_first(threads: &mut [Listed<ThreadRecord>]) {
    threads.sort_by(|a, b| {
        (a.value.created_at, &a.uri)
            .cmp(&(b.value.created_at, &b.uri))
            .reverse()
    });
}

/// Validates and writes a thread record to the caller's repository.
pub async fn create_thread(ctx: &ClientContext, input: NewThread) -> Result<StrongRef> {
    validate_thread_title(&input.title)?;
    let board = input.board.filter(|b| !b.is_empty());
    if let Some(board) = board.as_deref() {
        validate_board_id(board)?;
    }

    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let record = ThreadRecord {
        title: input.title,
        board,
        created_at: Utc::now(),
    };
    let value = record.to_value()?;
    let created = retry_transient(&ctx.settings().retry, "create_record", || {
        agent.create_record(&actor, Collection::Thread, value.clone())
    })
    .await?;

    info!(actor = %actor, board = ?record.board, uri = %created.uri, "created thread");
    Ok(created)
}
