//! # Bounded Fan-out
//!
//! Followed accounts are fetched in fixed-size batches. Each item in a batch
//! settles on its own: a failure or timeout is reported for that item only.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eb_core::{AppError, Follow, RepoAgent, Result};
use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::context::ClientContext;
use crate::retry::retry_transient;

/// Which repositories an aggregation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationScope {
    /// Only the caller's repository
    #[default]
    OwnRepository,
    /// The caller's repository and every account they follow
    IncludeFollows,
}

impl AggregationScope {
    pub fn from_flag(include_follows: bool) -> Self {
        if include_follows {
            AggregationScope::IncludeFollows
        } else {
            AggregationScope::OwnRepository
        }
    }

    pub fn includes_follows(self) -> bool {
        self == AggregationScope::IncludeFollows
    }
}

/// Runs `fetch` for every item, at most `batch_size` at a time. Results come
/// back in input order, paired with their item.
pub async fn settle_in_batches<I, T, F, Fut>(
    items: Vec<I>,
    batch_size: usize,
    per_item_timeout: Option<Duration>,
    fetch: F,
) -> Vec<(I, Result<T>)>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut settled = Vec::with_capacity(items.len());
    for batch in items.chunks(batch_size.max(1)) {
        let in_flight = batch.iter().cloned().map(|item| {
            let pending = fetch(item.clone());
            async move {
                let outcome = match per_item_timeout {
                    Some(limit) => timeout(limit, pending).await.unwrap_or_else(|_| {
                        Err(AppError::TransientRemote(format!(
                            "timed out after {} ms",
                            limit.as_millis()
                        )))
                    }),
                    None => pending.await,
                };
                (item, outcome)
            }
        });
        settled.extend(join_all(in_flight).await);
    }
    settled
}

/// Applies `fetch` to every account `actor` follows and keeps the successes.
///
/// Failures are logged and dropped. If the follow graph itself is unavailable
/// the result is empty, leaving the caller with its own repository only.
pub(crate) async fn collect_from_follows<T, F, Fut>(
    ctx: &ClientContext,
    agent: &Arc<dyn RepoAgent>,
    actor: &str,
    fetch: F,
) -> Vec<T>
where
    F: Fn(Follow) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let settings = ctx.settings();
    let follows = match retry_transient(&settings.retry, "get_follows", || {
        agent.get_follows(actor, settings.follow_limit)
    })
    .await
    {
        Ok(follows) => follows,
        Err(err) => {
            warn!(actor, error = %err, "follow graph unavailable, using own repository only");
            return Vec::new();
        }
    };

    let follows: Vec<Follow> = follows.into_iter().filter(|f| f.did != actor).collect();
    let total = follows.len();
    let settled = settle_in_batches(
        follows,
        settings.fanout_batch_size,
        Some(settings.follow_timeout),
        fetch,
    )
    .await;

    let mut collected = Vec::with_capacity(total);
    for (follow, outcome) in settled {
        match outcome {
            Ok(value) => collected.push(value),
            Err(err) => warn!(account = %follow.did, error = %err, "skipping followed account"),
        }
    }
    debug!(actor, follows = total, fetched = collected.len(), "fan-out finished");
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn batches_never_exceed_the_limit() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let results = settle_in_batches((0..7).collect(), 3, None, |n: u32| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n * 2)
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let doubled: Vec<u32> = results.into_iter().map(|(_, r)| r.unwrap()).collect();
        assert_eq!(doubled, vec![0, 2, 4, 6, 8, 10, 12]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let results = settle_in_batches(vec!["a", "bad", "c", "d"], 2, None, |name| async move {
            if name == "bad" {
                Err(AppError::Remote("boom".into()))
            } else {
                Ok(name.to_uppercase())
            }
        })
        .await;

        assert_eq!(results.len(), 4);
        assert!(results[1].1.is_err());
        let ok: Vec<String> = results.into_iter().filter_map(|(_, r)| r.ok()).collect();
        assert_eq!(ok, vec!["A", "C", "D"]);
    }

    #[tokio::test]
    async fn slow_items_time_out_individually() {
        let results = settle_in_batches(
            vec![1u64, 500],
            2,
            Some(Duration::from_millis(50)),
            |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms)
            },
        )
        .await;

        assert_eq!(results[0].1, Ok(1));
        assert!(matches!(results[1].1, Err(AppError::TransientRemote(_))));
    }

    #[test]
    fn scope_flag_mapping() {
        assert_eq!(AggregationScope::from_flag(true), AggregationScope::IncludeFollows);
        assert_eq!(AggregationScope::default(), AggregationScope::OwnRepository);
        assert!(!AggregationScope::OwnRepository.includes_follows());
    }
}
