//! # Boards
//!
//! A board is not stored by itself: it is the set of ids seen in BoardInfo
//! records and in the `board` field of thread records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use eb_core::validation::{validate_board_description, validate_board_name};
use eb_core::{BoardId, BoardInfoRecord, Collection, Listed, RecordSchema, RepoAgent, Result, ThreadRecord};
use rand::Rng;
use tracing::{info, warn};

use crate::context::{ClientContext, ClientSettings};
use crate::fanout::{collect_from_follows, AggregationScope};
use crate::records::fetch_all;
use crate::retry::retry_transient;

/// Length of a generated board id.
pub const BOARD_ID_LEN: usize = 8;
/// Random candidates tried before falling back to a time suffix.
pub const BOARD_ID_ATTEMPTS: usize = 5;

const BOARD_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
}

/// Sorted, distinct board ids of the caller, and of everyone they follow when
/// `scope` says so.
pub async fn list_boards(ctx: &ClientContext, scope: AggregationScope) -> Result<Vec<BoardId>> {
    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let settings = ctx.settings();

    let mut boards = board_ids_in_repo(agent.as_ref(), &actor, settings).await?;
    if scope.includes_follows() {
        let followed = collect_from_follows(ctx, &agent, &actor, |follow| {
            let agent = agent.clone();
            async move { board_ids_in_repo(agent.as_ref(), &follow.did, settings).await }
        })
        .await;
        for ids in followed {
            boards.extend(ids);
        }
    }

    info!(actor = %actor, ?scope, boards = boards.len(), "listed boards");
    Ok(boards.into_iter().collect())
}

/// Creates a BoardInfo record under a fresh id that none of the caller's
/// boards uses yet.
///
/// Uniqueness is checked against one snapshot of the caller's repository, so
/// two concurrent creators can still race.
pub async fn create_board(ctx: &ClientContext, input: NewBoard) -> Result<Listed<BoardInfoRecord>> {
    create_board_with(ctx, input, || random_board_id(&mut rand::thread_rng())).await
}

/// [`create_board`] drawing id candidates from `candidate`.
pub async fn create_board_with<F>(
    ctx: &ClientContext,
    input: NewBoard,
    candidate: F,
) -> Result<Listed<BoardInfoRecord>>
where
    F: FnMut() -> BoardId,
{
    validate_board_name(&input.name)?;
    validate_board_description(input.description.as_deref())?;

    let actor = ctx.actor()?;
    let agent = ctx.repo()?;
    let settings = ctx.settings();

    let existing = match board_ids_in_repo(agent.as_ref(), &actor, settings).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(actor = %actor, error = %err, "could not load existing boards, skipping duplicate check");
            BTreeSet::new()
        }
    };
    let now = Utc::now();
    let board_id = generate_board_id(&existing, candidate, now);

    let record = BoardInfoRecord {
        board_id,
        name: input.name,
        description: input.description.filter(|d| !d.is_empty()),
        thumbnail: None,
        created_at: now,
        updated_at: None,
    };
    let value = record.to_value()?;
    let created = retry_transient(&settings.retry, "put_record", || {
        agent.put_record(&actor, Collection::BoardInfo, &record.board_id, value.clone())
    })
    .await?;

    info!(actor = %actor, board = %record.board_id, uri = %created.uri, "created board");
    Ok(Listed {
        uri: created.uri,
        cid: created.cid,
        value: record,
    })
}

/// Board ids named by BoardInfo records and thread records of `repo`.
pub(crate) async fn board_ids_in_repo(
    agent: &dyn RepoAgent,
    repo: &str,
    settings: &ClientSettings,
) -> Result<BTreeSet<BoardId>> {
    let infos = fetch_all::<BoardInfoRecord>(agent, repo, settings).await?;
    let threads = fetch_all::<ThreadRecord>(agent, repo, settings).await?;
    Ok(infos
        .into_iter()
        .map(|info| info.value.board_id)
        .chain(threads.into_iter().filter_map(|thread| thread.value.board))
        .filter(|id| !id.is_empty())
        .collect())
}

/// Lowercase alphanumeric id of [`BOARD_ID_LEN`] characters.
pub fn random_board_id<R: Rng>(rng: &mut R) -> BoardId {
    (0..BOARD_ID_LEN)
        .map(|_| BOARD_ID_ALPHABET[rng.gen_range(0..BOARD_ID_ALPHABET.len())] as char)
        .collect()
}

/// First candidate not in `existing`. After [`BOARD_ID_ATTEMPTS`] collisions the
/// last candidate gets a base-36 millisecond suffix derived from `now`.
pub fn generate_board_id<F>(existing: &BTreeSet<BoardId>, mut candidate: F, now: DateTime<Utc>) -> BoardId
where
    F: FnMut() -> BoardId,
{
    let mut last = BoardId::new();
    for _ in 0..BOARD_ID_ATTEMPTS {
        let id = candidate();
        if !existing.contains(&id) {
            return id;
        }
        last = id;
    }
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("{last}-{}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    let mut digits = Vec::new();
    loop {
        let d = (n % 36) as u8;
        digits.push(if d < 10 { b'0' + d } else { b'a' + d - 10 });
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eb_core::validation::validate_board_id;

    #[test]
    fn random_ids_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = random_board_id(&mut rng);
            assert_eq!(id.len(), BOARD_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
            assert!(validate_board_id(&id).is_ok());
        }
    }

    #[test]
    fn first_free_candidate_wins() {
        let existing: BTreeSet<BoardId> = ["aaaa0000".to_string()].into();
        let mut candidates = vec!["bbbb1111", "aaaa0000"];
        let id = generate_board_id(&existing, || candidates.pop().unwrap().to_string(), Utc::now());
        assert_eq!(id, "bbbb1111");
    }

    #[test]
    fn exhausted_candidates_get_a_time_suffix() {
        let existing: BTreeSet<BoardId> = ["dupe0000".to_string()].into();
        let mut calls = 0;
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let id = generate_board_id(
            &existing,
            || {
                calls += 1;
                "dupe0000".to_string()
            },
            now,
        );
        assert_eq!(calls, BOARD_ID_ATTEMPTS);
        assert_eq!(id, format!("dupe0000-{}", to_base36(1_700_000_000_000)));
        assert!(validate_board_id(&id).is_ok());
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
    }
}
