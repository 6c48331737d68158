use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::catalog::RequestSpec;
use crate::executor::{Outcome, RequestExecutor};
use crate::stats::{RoundResult, RoundTally};

/// Spawns `n` tasks built by `make` and waits for every one of them.
///
/// Results come back in completion order. A task that panics shows up as an
/// `Err` and does not affect its siblings.
pub async fn fan_out_join<F, Fut, T>(n: usize, mut make: F) -> Vec<Result<T, JoinError>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut pending: FuturesUnordered<_> = (0..n).map(|i| tokio::spawn(make(i))).collect();
    let mut results = Vec::with_capacity(n);
    while let Some(result) = pending.next().await {
        results.push(result);
    }
    results
}

/// Launches `budget` concurrent calls, call `i` using `specs[i % specs.len()]`,
/// and returns once all of them have settled.
pub async fn run_round<E: RequestExecutor>(
    executor: &Arc<E>,
    specs: &[RequestSpec],
    budget: usize,
) -> RoundResult {
    let started_at = Instant::now();
    let tally = Arc::new(RoundTally::default());

    if specs.is_empty() {
        warn!(budget, "round has no request specs, counting every call as an error");
        for _ in 0..budget {
            tally.record_error();
        }
        return finish(budget, started_at, &tally, Vec::new());
    }

    let results = fan_out_join(budget, |i| {
        let executor = Arc::clone(executor);
        let tally = Arc::clone(&tally);
        let spec = specs[i % specs.len()].clone();
        async move {
            match executor.execute(&spec).await {
                Outcome::Success { latency } => {
                    tally.record_success();
                    Some(latency)
                }
                Outcome::Failed(err) => {
                    tally.record_error();
                    trace!(kind = err.kind(), "call failed");
                    None
                }
            }
        }
    })
    .await;

    let mut latencies = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(Some(latency)) => latencies.push(latency),
            Ok(None) => {}
            Err(err) => {
                // The task died before reporting.
                tally.record_error();
                warn!("request task failed: {}", err);
            }
        }
    }

    finish(budget, started_at, &tally, latencies)
}

fn finish(
    budget: usize,
    started_at: Instant,
    tally: &RoundTally,
    latencies: Vec<Duration>,
) -> RoundResult {
    let (attempts, successes, errors) = tally.snapshot();
    let result = RoundResult {
        budget,
        attempts,
        successes,
        errors,
        started_at,
        settled_at: Instant::now(),
        latencies,
    };
    debug_assert!(result.is_balanced(), "unbalanced round: {result:?}");
    debug!(
        attempts,
        errors,
        elapsed_ms = whole_millis(result.elapsed()),
        "round settled"
    );
    result
}

/// Saturates instead of truncating.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
