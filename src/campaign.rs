use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::{CampaignConfig, ConfigError};
use crate::executor::RequestExecutor;
use crate::pacer::{Pacer, PacerError, PacerHandle};
use crate::round::run_round;
use crate::stats::CampaignCounters;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pacer(#[from] PacerError),
    #[error("Failed to create latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

/// Runs pacer cycles back to back for the configured duration.
pub struct Campaign<E> {
    config: CampaignConfig,
    catalog: Arc<Catalog>,
    executor: Arc<E>,
    pacer: Pacer,
}

impl<E: RequestExecutor> Campaign<E> {
    pub fn new(config: CampaignConfig, catalog: Catalog, executor: E) -> Result<Self, CampaignError> {
        config.validate(&catalog)?;
        let pacer = Pacer::new(config.tick_interval, config.catch_up)?;
        Ok(Campaign {
            config,
            catalog: Arc::new(catalog),
            executor: Arc::new(executor),
            pacer,
        })
    }

    /// Runs until the duration elapses or `shutdown` resolves. On shutdown the
    /// current round is drained and counted before returning.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<CampaignCounters, CampaignError> {
        let mut counters = CampaignCounters::new()?;
        tokio::pin!(shutdown);

        let duration = self.config.duration_seconds;
        let cycle_ticks = self.config.cycle_ticks;
        let mut elapsed_ticks = 0u64;

        while elapsed_ticks < duration {
            let ticks = cycle_ticks.min(duration - elapsed_ticks);
            let mut handle = self.start_cycle(elapsed_ticks, ticks);

            let finished = tokio::select! {
                report = handle.wait() => Some(report),
                _ = &mut shutdown => None,
            };
            let interrupted = finished.is_none();
            let report = match finished {
                Some(report) => report?,
                None => {
                    info!(state = ?handle.state(), "shutdown requested, draining in-flight round");
                    handle.stop().await?
                }
            };

            for round in &report.rounds {
                round.publish_metrics();
                counters.absorb(round);
            }
            debug!(
                first_tick = elapsed_ticks,
                ticks = report.totals.ticks,
                attempts = report.totals.attempts,
                errors = report.totals.errors,
                "cycle complete"
            );

            elapsed_ticks += ticks;
            if interrupted || report.stopped_early {
                break;
            }
        }

        Ok(counters)
    }

    fn start_cycle(&self, first_tick: u64, ticks: u64) -> PacerHandle {
        let executor = Arc::clone(&self.executor);
        let catalog = Arc::clone(&self.catalog);
        let selection = self.config.selection;
        let qps = self.config.qps;

        self.pacer.start(ticks, move |tick| {
            let executor = Arc::clone(&executor);
            let plan = selection.plan(&catalog, first_tick + tick, qps);
            async move {
                match plan {
                    Some(plan) => run_round(&executor, &plan.specs, plan.budget).await,
                    None => run_round(&executor, &[], qps).await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Selection;
    use crate::testing::StubExecutor;
    use std::time::Duration;
    use tokio::time::{self, Instant};

    fn config(qps: usize, duration_seconds: u64) -> anyhow::Result<CampaignConfig> {
        let mut config = CampaignConfig::new(CampaignConfig::parse_target("http://127.0.0.1:9/")?);
        config.qps = qps;
        config.duration_seconds = duration_seconds;
        Ok(config)
    }

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn one_cycle_per_second_for_the_whole_duration() -> anyhow::Result<()> {
        let executor = StubExecutor::succeeding(Duration::from_millis(30));
        let campaign = Campaign::new(config(4, 5)?, Catalog::builtin(), executor)?;
        let start = Instant::now();

        let totals = campaign.run(never()).await?.totals();

        assert_eq!((totals.ticks, totals.attempts, totals.successes), (5, 20, 20));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5100));
        assert_eq!(campaign.executor.calls(), 20);
        assert!(campaign.executor.seen().iter().all(|name| *name == "happy_path_xml"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn last_cycle_takes_the_remainder() -> anyhow::Result<()> {
        let mut config = config(3, 5)?;
        config.cycle_ticks = 2;
        let campaign = Campaign::new(config, Catalog::builtin(), StubExecutor::succeeding(Duration::ZERO))?;

        let totals = campaign.run(never()).await?.totals();
        assert_eq!((totals.ticks, totals.attempts), (5, 15));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn rotate_moves_through_the_catalog_each_round() -> anyhow::Result<()> {
        let mut config = config(1, 3)?;
        config.selection = Selection::Rotate;
        let campaign = Campaign::new(config, Catalog::builtin(), StubExecutor::succeeding(Duration::ZERO))?;

        campaign.run(never()).await?;
        assert_eq!(
            campaign.executor.seen(),
            ["vast_wrapper_xml", "json_boolean", "plain_text"]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_rounds_make_whole_passes() -> anyhow::Result<()> {
        let mut config = config(25, 2)?;
        config.selection = Selection::Sweep;
        let campaign = Campaign::new(config, Catalog::builtin(), StubExecutor::succeeding(Duration::ZERO))?;

        let totals = campaign.run(never()).await?.totals();
        assert_eq!(totals.attempts, 60);
        assert_eq!(totals.errors, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_and_stops_early() -> anyhow::Result<()> {
        let executor = StubExecutor::succeeding(Duration::from_millis(400));
        let campaign = Campaign::new(config(6, 10)?, Catalog::builtin(), executor)?;

        let counters = campaign
            .run(time::sleep(Duration::from_millis(2200)))
            .await?;

        let totals = counters.totals();
        assert_eq!((totals.ticks, totals.attempts), (3, 18));
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(campaign.executor.calls(), 18);
        Ok(())
    }

    #[test]
    fn invalid_configuration_is_rejected() -> anyhow::Result<()> {
        let mut config = config(300, 10)?;
        config.selection = Selection::Fixed(42);
        let result = Campaign::new(config, Catalog::builtin(), StubExecutor::succeeding(Duration::ZERO));
        assert!(matches!(
            result,
            Err(CampaignError::Config(ConfigError::PayloadOutOfRange { index: 42, .. }))
        ));
        Ok(())
    }
}
