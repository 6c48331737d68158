mod campaign;
mod catalog;
mod config;
mod executor;
mod logger;
mod pacer;
mod round;
mod stats;
#[cfg(test)]
mod testing;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use campaign::Campaign;
use catalog::{Catalog, Selection, DEFAULT_PAYLOAD};
use config::{CampaignConfig, ConfigError, DEFAULT_DURATION_SECONDS, DEFAULT_QPS, DEFAULT_TIMEOUT_MS};
use executor::HttpExecutor;
use pacer::CatchUp;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of runtime worker threads
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Requests launched per tick
    #[arg(short = 'q', long, default_value_t = DEFAULT_QPS)]
    qps: usize,

    /// Duration of the test in seconds
    #[arg(short = 'd', long, default_value_t = DEFAULT_DURATION_SECONDS)]
    duration: u64,

    /// Timeout for each request in milliseconds
    #[arg(short = 'T', long = "timeout-ms", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Catalog index of the payload to send
    #[arg(short = 'p', long, default_value_t = DEFAULT_PAYLOAD)]
    payload: usize,

    /// Use the next catalog payload on every tick
    #[arg(long, conflicts_with = "sweep")]
    rotate: bool,

    /// Send whole passes over the catalog on every tick
    #[arg(long)]
    sweep: bool,

    /// Host header to present instead of the URL's authority
    #[arg(long)]
    host_header: Option<String>,

    /// Skip TLS certificate and hostname verification
    #[arg(long)]
    insecure: bool,

    /// Log request and response bodies of successful calls
    #[arg(long)]
    log_success: bool,

    /// Log every failed call
    #[arg(long)]
    log_error: bool,

    /// What to do with ticks missed by an overrunning round
    #[arg(long, value_enum, default_value_t = CatchUp::FastFollow)]
    catch_up: CatchUp,

    /// Ticks supervised by each pacer cycle
    #[arg(long, default_value_t = 1)]
    cycle_ticks: u64,

    /// Log at debug level
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Target URL
    #[arg(required = true)]
    url: String,
}

impl Args {
    fn to_config(&self) -> Result<CampaignConfig, ConfigError> {
        let mut config = CampaignConfig::new(CampaignConfig::parse_target(&self.url)?);
        config.qps = self.qps;
        config.duration_seconds = self.duration;
        config.timeout = Duration::from_millis(self.timeout_ms);
        config.log_success = self.log_success;
        config.log_error = self.log_error;
        config.host_header = self.host_header.clone();
        config.insecure = self.insecure;
        config.selection = if self.sweep {
            Selection::Sweep
        } else if self.rotate {
            Selection::Rotate
        } else {
            Selection::Fixed(self.payload)
        };
        config.catch_up = self.catch_up;
        config.cycle_ticks = self.cycle_ticks;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_logging(args.verbose);

    let config = args.to_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(run(config, args.threads.max(1)))
}

async fn run(config: CampaignConfig, threads: usize) -> Result<()> {
    let executor = HttpExecutor::new(config.executor_settings()?)?;

    println!("Running {}s test @ {}", config.duration_seconds, config.target);
    println!(
        "  {} requests per tick, {:?} payload, {} threads",
        config.qps, config.selection, threads
    );
    println!();

    let campaign = Campaign::new(config, Catalog::builtin(), executor)?;
    let start = Instant::now();
    let counters = campaign.run(shutdown_signal()).await?;
    counters.print_stats(start.elapsed());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
}
