//! # Reactions
//!
//! A reaction is stored under a key derived from (subject, kind, actor), so
//! reacting twice overwrites the same record. There is no removal.

use std::collections::BTreeMap;

use chrono::Utc;
use eb_core::{
    build_reaction_key, Collection, Listed, ReactionKind, ReactionRecord, RecordSchema, Result, StrongRef,
};
use tracing::{debug, info};

use crate::context::ClientContext;
use crate::records::decode_records;
use crate::retry::retry_transient;

/// Upper bound on one page of reactions.
pub const MAX_REACTION_PAGE: u32 = 100;

/// Writes the caller's reaction of `kind` to `subject`. Repeating the call
/// rewrites the same record.
pub async fn toggle_reaction(ctx: &ClientContext, subject: StrongRef, kind: ReactionKind) -> Result<StrongRef> {
    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let rkey = build_reaction_key(&subject.uri, kind, &actor);
    let record = ReactionRecord::new(subject, kind, Utc::now());
    let value = record.to_value()?;

    let stored = retry_transient(&ctx.settings().retry, "put_record", || {
        agent.put_record(&actor, Collection::Reaction, &rkey, value.clone())
    })
    .await?;

    info!(actor = %actor, subject = %record.subject.uri, %kind, uri = %stored.uri, "recorded reaction");
    Ok(stored)
}

#[derive(Debug, Clone, Default)]
pub struct ReactionQuery {
    pub subject_uri: String,
    /// Repository to read; the caller's own when `None`
    pub repo: Option<String>,
    pub cursor: Option<String>,
    /// Clamped to `1..=MAX_REACTION_PAGE`
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ReactionPage {
    pub records: Vec<Listed<ReactionRecord>>,
    pub cursor: Option<String>,
}

/// One page of reactions from a single repository, keeping only those whose
/// subject is exactly `query.subject_uri`. The filter runs after paging, so a
/// page may come back short or empty while the cursor is still set.
pub async fn list_reactions_for_subject(ctx: &ClientContext, query: ReactionQuery) -> Result<ReactionPage> {
    let agent = ctx.repo()?;
    let repo = match query.repo {
        Some(repo) => repo,
        None => ctx.actor()?,
    };
    let limit = query.limit.unwrap_or(MAX_REACTION_PAGE).clamp(1, MAX_REACTION_PAGE);

    let page = retry_transient(&ctx.settings().retry, "list_records", || {
        agent.list_records(&repo, Collection::Reaction, limit, query.cursor.clone())
    })
    .await?;
    let fetched = page.records.len();
    let records: Vec<Listed<ReactionRecord>> = decode_records::<ReactionRecord>(page.records)
        .into_iter()
        .filter(|r| r.value.subject.uri == query.subject_uri)
        .collect();

    debug!(repo = %repo, subject = %query.subject_uri, fetched, kept = records.len(), "listed reactions");
    Ok(ReactionPage {
        records,
        cursor: page.cursor.filter(|c| !c.is_empty()),
    })
}

/// Count per reaction kind. Every known kind is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionTally(BTreeMap<ReactionKind, u32>);

impl ReactionTally {
    pub fn get(&self, kind: ReactionKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReactionKind, u32)> + '_ {
        self.0.iter().map(|(kind, count)| (*kind, *count))
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

/// Tallies records by kind. Records with a kind outside the known set are
/// ignored.
pub fn count_reactions(records: &[Listed<ReactionRecord>]) -> ReactionTally {
    let mut counts: BTreeMap<ReactionKind, u32> = ReactionKind::ALL.iter().map(|kind| (*kind, 0)).collect();
    for kind in records.iter().filter_map(|r| r.value.kind()) {
        *counts.entry(kind).or_default() += 1;
    }
    ReactionTally(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(kind: &str) -> Listed<ReactionRecord> {
        Listed {
            uri: format!("at://did:plc:a/app.echosky.board.reaction/{kind}"),
            cid: "cid".into(),
            value: ReactionRecord {
                subject: StrongRef {
                    uri: "at://did:plc:a/app.echosky.board.thread/1".into(),
                    cid: "bafy".into(),
                },
                reaction: kind.into(),
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn empty_tally_has_every_kind_at_zero() {
        let tally = count_reactions(&[]);
        assert_eq!(tally.iter().count(), ReactionKind::ALL.len());
        assert!(tally.iter().all(|(_, count)| count == 0));
        assert_eq!(tally.total(), 0);
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let tally = count_reactions(&[reaction("like"), reaction("like"), reaction("star"), reaction("heart")]);
        assert_eq!(tally.get(ReactionKind::Like), 2);
        assert_eq!(tally.get(ReactionKind::Star), 1);
        assert_eq!(tally.get(ReactionKind::Sad), 0);
        assert_eq!(tally.total(), 3);
    }
}
