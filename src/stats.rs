use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use tokio::time::Instant;

/// Per-round accumulator. Tasks report into it concurrently, one record per call.
#[derive(Debug, Default)]
pub struct RoundTally {
    attempts: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
}

impl RoundTally {
    pub fn record_success(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `(attempts, successes, errors)`. Only meaningful once every
    /// reporting task has been joined.
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.attempts.load(Ordering::Acquire),
            self.successes.load(Ordering::Acquire),
            self.errors.load(Ordering::Acquire),
        )
    }
}

/// Counts for exactly one dispatch round.
#[derive(Debug, Clone)]
pub struct RoundResult {
    pub budget: usize,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
    pub started_at: Instant,
    pub settled_at: Instant,
    /// Latency of each successful call.
    pub latencies: Vec<Duration>,
}

impl RoundResult {
    pub fn elapsed(&self) -> Duration {
        self.settled_at.saturating_duration_since(self.started_at)
    }

    /// Every launched call accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.attempts == self.successes + self.errors && self.attempts == self.budget as u64
    }

    pub fn publish_metrics(&self) {
        metrics::counter!("ratewrk_requests_total").increment(self.attempts);
        metrics::counter!("ratewrk_errors_total").increment(self.errors);
        metrics::gauge!("ratewrk_round_duration_seconds").set(self.elapsed().as_secs_f64());
    }
}

/// Running attempt/success/error counts over completed rounds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub ticks: u64,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
}

impl Totals {
    pub fn absorb(&mut self, round: &RoundResult) {
        self.ticks += 1;
        self.attempts += round.attempts;
        self.successes += round.successes;
        self.errors += round.errors;
    }
}

/// Cumulative counters for a whole campaign.
pub struct CampaignCounters {
    totals: Totals,
    latency: Histogram<u64>,
}

impl CampaignCounters {
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(CampaignCounters {
            totals: Totals::default(),
            latency: Histogram::<u64>::new(3)?,
        })
    }

    pub fn absorb(&mut self, round: &RoundResult) {
        self.totals.absorb(round);
        for latency in &round.latencies {
            let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
            self.latency.saturating_record(micros);
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn print_stats(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let Totals {
            ticks,
            attempts,
            successes,
            errors,
        } = self.totals;

        println!("\nStatistics:");
        println!("  Ticks: {}", ticks);
        if secs > 0.0 {
            println!("  Requests/sec: {:.2}", attempts as f64 / secs);
        }

        if !self.latency.is_empty() {
            println!("\nLatency:");
            println!("  Avg: {:.2}ms", self.latency.mean() / 1000.0);
            println!("  Min: {:.2}ms", self.latency.min() as f64 / 1000.0);
            println!("  Max: {:.2}ms", self.latency.max() as f64 / 1000.0);
            println!(
                "  P99: {:.2}ms",
                self.latency.value_at_quantile(0.99) as f64 / 1000.0
            );
        }

        if attempts > 0 {
            let rate = |n: u64| n as f64 / attempts as f64 * 100.0;
            println!("\nSuccess: {:.2}% ({}/{})", rate(successes), successes, attempts);
            println!("Errors: {:.2}% ({} errors)", rate(errors), errors);
        } else {
            println!("\nNo requests were issued.");
        }
    }
}
