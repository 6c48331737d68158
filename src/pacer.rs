use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::stats::{RoundResult, Totals};

#[derive(Debug, Error)]
pub enum PacerError {
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    #[error("scheduling loop failed: {0}")]
    Loop(#[from] JoinError),
}

/// What to do with ticks that elapse while a round is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CatchUp {
    /// Missed ticks coalesce into one that fires as soon as the round drains.
    #[default]
    FastFollow,
    /// Missed ticks are dropped; the next round waits for the next boundary.
    Skip,
}

impl CatchUp {
    /// Given the grid slot of the last tick, returns when the next tick fires
    /// and which grid slot it stands for.
    fn next_tick(self, last_slot: Instant, period: Duration, now: Instant) -> (Instant, Instant) {
        let due = last_slot + period;
        if now <= due {
            return (due, due);
        }
        let behind = now - due;
        let missed = u32::try_from(behind.as_nanos() / period.as_nanos()).unwrap_or(u32::MAX);
        let latest = period
            .checked_mul(missed)
            .map_or(now, |offset| due + offset);
        match self {
            CatchUp::FastFollow => (now, latest),
            CatchUp::Skip if latest == now => (now, now),
            CatchUp::Skip => (latest + period, latest + period),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    Running,
    Stopped,
}

/// Rounds supervised by one pacer cycle.
#[derive(Debug, Default)]
pub struct PacerReport {
    pub rounds: Vec<RoundResult>,
    pub totals: Totals,
    /// Stopped by a signal before running every tick.
    pub stopped_early: bool,
}

impl PacerReport {
    fn absorb(&mut self, round: RoundResult) {
        self.totals.absorb(&round);
        self.rounds.push(round);
    }
}

/// Fires one round per interval, never two at once.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
    catch_up: CatchUp,
}

impl Pacer {
    pub fn new(interval: Duration, catch_up: CatchUp) -> Result<Self, PacerError> {
        if interval.is_zero() {
            return Err(PacerError::ZeroInterval);
        }
        Ok(Pacer { interval, catch_up })
    }

    /// Spawns the scheduling loop. The first tick fires immediately; after
    /// `ticks` rounds the loop waits out its last interval and exits.
    pub fn start<F, Fut>(&self, ticks: u64, mut on_tick: F) -> PacerHandle
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = RoundResult> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let Pacer { interval, catch_up } = *self;

        let task = tokio::spawn(async move {
            let mut report = PacerReport::default();
            let mut slot = Instant::now();
            let mut fire_at = slot;

            for tick in 0..ticks {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        debug!(tick, "pacer stopped before tick");
                        report.stopped_early = true;
                        return report;
                    }
                    _ = time::sleep_until(fire_at) => {}
                }

                // The round is awaited outside the select so a stop never cuts it short.
                let round = on_tick(tick).await;
                info!("QPS = {}; Errors = {}", round.attempts, round.errors);
                report.absorb(round);
                (fire_at, slot) = catch_up.next_tick(slot, interval, Instant::now());
            }

            if ticks > 0 {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {}
                    _ = time::sleep_until(fire_at) => {}
                }
            }
            report
        });

        PacerHandle { stop_tx, task }
    }
}

pub struct PacerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<PacerReport>,
}

impl PacerHandle {
    pub fn state(&self) -> PacerState {
        if self.task.is_finished() {
            PacerState::Stopped
        } else {
            PacerState::Running
        }
    }

    /// Waits for the loop to finish on its own.
    pub async fn wait(&mut self) -> Result<PacerReport, PacerError> {
        Ok((&mut self.task).await?)
    }

    /// Signals the loop and waits for the in-flight round to drain. No round
    /// starts after this returns.
    pub async fn stop(self) -> Result<PacerReport, PacerError> {
        let PacerHandle { stop_tx, task } = self;
        // Fails only when the loop has already exited.
        let _ = stop_tx.send(true);
        let report = task.await?;
        drop(stop_tx);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RequestSpec;
    use crate::round::run_round;
    use crate::testing::StubExecutor;
    use std::sync::Arc;

    const SECOND: Duration = Duration::from_secs(1);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn rounds_of(
        executor: &Arc<StubExecutor>,
        budget: usize,
    ) -> impl FnMut(u64) -> std::pin::Pin<Box<dyn Future<Output = RoundResult> + Send>> + Send + 'static
    {
        let executor = Arc::clone(executor);
        let specs = vec![RequestSpec::new("a", "{}")];
        move |_| {
            let executor = Arc::clone(&executor);
            let specs = specs.clone();
            Box::pin(async move { run_round(&executor, &specs, budget).await })
        }
    }

    #[test]
    fn on_time_ticks_follow_the_grid() {
        let start = Instant::now();
        for policy in [CatchUp::FastFollow, CatchUp::Skip] {
            let next = policy.next_tick(start, SECOND, start + ms(300));
            assert_eq!(next, (start + SECOND, start + SECOND));
        }
    }

    #[test]
    fn fast_follow_fires_now_and_keeps_the_grid() {
        let start = Instant::now();
        let next = CatchUp::FastFollow.next_tick(start, SECOND, start + ms(2500));
        assert_eq!(next, (start + ms(2500), start + ms(2000)));
    }

    #[test]
    fn skip_waits_for_the_next_boundary() {
        let start = Instant::now();
        let next = CatchUp::Skip.next_tick(start, SECOND, start + ms(2500));
        assert_eq!(next, (start + ms(3000), start + ms(3000)));
        let exact = CatchUp::Skip.next_tick(start, SECOND, start + ms(2000));
        assert_eq!(exact, (start + ms(2000), start + ms(2000)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            Pacer::new(Duration::ZERO, CatchUp::FastFollow),
            Err(PacerError::ZeroInterval)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_one_round_per_tick_and_spans_the_cycle() -> Result<(), PacerError> {
        let executor = Arc::new(StubExecutor::succeeding(ms(10)));
        let pacer = Pacer::new(SECOND, CatchUp::FastFollow)?;
        let start = Instant::now();

        let mut handle = pacer.start(3, rounds_of(&executor, 5));
        let report = handle.wait().await?;

        assert_eq!(report.rounds.len(), 3);
        assert_eq!(report.totals.attempts, 15);
        assert_eq!(report.totals.ticks, 3);
        assert!(!report.stopped_early);
        assert_eq!(handle.state(), PacerState::Stopped);
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(3000) && elapsed < ms(3050), "cycle took {elapsed:?}");
        for (k, round) in report.rounds.iter().enumerate() {
            let offset = round.started_at - start;
            assert!(offset >= SECOND * k as u32 && offset < SECOND * k as u32 + ms(20));
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_rounds_never_overlap() -> Result<(), PacerError> {
        let executor = Arc::new(StubExecutor::succeeding(ms(1500)));
        let pacer = Pacer::new(SECOND, CatchUp::FastFollow)?;

        let mut handle = pacer.start(4, rounds_of(&executor, 20));
        let report = handle.wait().await?;

        assert_eq!(report.rounds.len(), 4);
        for pair in report.rounds.windows(2) {
            assert!(pair[1].started_at >= pair[0].settled_at);
        }
        assert!(report.rounds.iter().all(RoundResult::is_balanced));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn catch_up_policy_decides_the_follow_up() -> Result<(), PacerError> {
        for (policy, expected_gap) in [(CatchUp::FastFollow, ms(0)), (CatchUp::Skip, ms(500))] {
            let executor = Arc::new(StubExecutor::succeeding(ms(2500)));
            let pacer = Pacer::new(SECOND, policy)?;

            let mut handle = pacer.start(2, rounds_of(&executor, 3));
            let report = handle.wait().await?;

            assert_eq!(report.rounds.len(), 2, "{policy:?}");
            let gap = report.rounds[1].started_at - report.rounds[0].settled_at;
            assert!(
                gap >= expected_gap && gap < expected_gap + ms(20),
                "{policy:?} gap {gap:?}"
            );
        }
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drains_the_in_flight_round() -> Result<(), PacerError> {
        let executor = Arc::new(StubExecutor::succeeding(ms(600)));
        let pacer = Pacer::new(SECOND, CatchUp::FastFollow)?;
        let start = Instant::now();

        let handle = pacer.start(10, rounds_of(&executor, 8));
        time::sleep(ms(300)).await;
        assert_eq!(handle.state(), PacerState::Running);
        let report = handle.stop().await?;

        assert!(start.elapsed() >= ms(600));
        assert!(report.stopped_early);
        assert_eq!(report.rounds.len(), 1);
        assert_eq!(report.totals.attempts, 8);

        time::sleep(ms(5000)).await;
        assert_eq!(executor.calls(), 8);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ticks_returns_immediately() -> Result<(), PacerError> {
        let executor = Arc::new(StubExecutor::succeeding(ms(10)));
        let pacer = Pacer::new(SECOND, CatchUp::FastFollow)?;

        let report = pacer.start(0, rounds_of(&executor, 5)).stop().await?;
        assert!(report.rounds.is_empty());
        assert_eq!(executor.calls(), 0);
        Ok(())
    }
}
