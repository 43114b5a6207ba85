//! # Posts
//!
//! Replies live in the repository of whoever wrote them, so a thread's posts
//! are gathered the same way threads are.

use std::collections::HashSet;

use chrono::Utc;
use eb_core::validation::validate_post_text;
use eb_core::{AppError, Collection, Listed, PostRecord, RecordSchema, Result, StrongRef};
use tracing::info;

use crate::context::ClientContext;
use crate::fanout::{collect_from_follows, AggregationScope};
use crate::records::fetch_all;
use crate::retry::retry_transient;

#[derive(Debug, Clone)]
pub struct NewPost {
    /// URI of the thread being replied to
    pub thread_uri: String,
    pub text: String,
    /// The post this one answers, if any
    pub reply_to: Option<StrongRef>,
}

pub async fn create_post(ctx: &ClientContext, input: NewPost) -> Result<StrongRef> {
    if input.thread_uri.trim().is_empty() {
        return Err(AppError::Validation("thread uri must not be empty".into()));
    }
    validate_post_text(&input.text)?;

    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let record = PostRecord {
        thread: input.thread_uri,
        text: input.text,
        created_at: Utc::now(),
        facets: None,
        ref_post: input.reply_to,
    };
    let value = record.to_value()?;
    let created = retry_transient(&ctx.settings().retry, "create_record", || {
        agent.create_record(&actor, Collection::Post, value.clone())
    })
    .await?;

    info!(actor = %actor, thread = %record.thread, uri = %created.uri, "created post");
    Ok(created)
}

/// Posts oldest first by (created_at, uri), optionally restricted to one thread.
pub async fn list_posts(
    ctx: &ClientContext,
    thread_uri: Option<&str>,
    scope: AggregationScope,
) -> Result<Vec<Listed<PostRecord>>> {
    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let settings = ctx.settings();

    let mut batches = vec![fetch_all::<PostRecord>(agent.as_ref(), &actor, settings).await?];
    if scope.includes_follows() {
        batches.extend(
            collect_from_follows(ctx, &agent, &actor, |follow| {
                let agent = agent.clone();
                async move { fetch_all::<PostRecord>(agent.as_ref(), &follow.did, settings).await }
            })
            .await,
        );
    }

    let mut seen = HashSet::new();
    let mut posts: Vec<Listed<PostRecord>> = batches
        .into_iter()
        .flatten()
        .filter(|post| thread_uri.map_or(true, |t| post.value.thread == t))
        .filter(|post| seen.insert(post.uri.clone()))
        .collect();
    posts.sort_by(|a, b| (a.value.created_at, &a.uri).cmp(&(b.value.created_at, &b.uri)));

    info!(actor = %actor, ?scope, thread = ?thread_uri, posts = posts.len(), "listed posts");
    Ok(posts)
}
