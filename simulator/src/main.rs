//! fxpair Simulator
//!
//! Drives the conversion engine through scripted or random sessions.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxpair_fx::{ConverterConfig, HttpRateFetcher, RateStore};

mod controller;
mod market;
mod metrics;
mod scenario;

use controller::SimulationController;
use market::SimulatedMarket;
use scenario::Scenario;

/// fxpair Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "fxpair conversion engine simulation environment")]
struct Args {
    /// Scenario to run (built-in name or path to a JSON file)
    #[arg(short, long)]
    scenario: Option<String>,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = infinite)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Upper bound of simulated provider latency
    #[arg(long, default_value = "250")]
    max_latency_ms: u64,

    /// Talk to the configured HTTP provider instead of the simulated market
    #[arg(long)]
    live: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(args.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json).then(tracing_subscriber::fmt::layer))
        .init();

    if args.speed <= 0.0 {
        anyhow::bail!("Speed must be positive, got {}", args.speed);
    }

    let config = ConverterConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    info!("Starting fxpair Simulator");
    info!("Speed: {}x", args.speed);

    let mut controller = if args.live {
        info!("Provider: {}", config.provider_url);
        let fetcher = HttpRateFetcher::new(&config)?;
        let store = RateStore::new(Arc::new(fetcher));
        SimulationController::with_store(store, &config, args.speed, args.seed)
    } else {
        info!("Provider: simulated, latency up to {}ms", args.max_latency_ms);
        let market = Arc::new(SimulatedMarket::new(args.max_latency_ms, args.seed));
        SimulationController::simulated(market, &config, args.speed, args.seed)
    };

    if let Some(scenario_name) = &args.scenario {
        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(&scenario).await?;
    } else {
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration).await?;
    }

    let metrics = controller.metrics();
    info!("Simulation complete");
    info!("Operations: {}", metrics.operations);
    info!("Fetches issued: {}", metrics.store.issued);
    info!("Applied: {}", metrics.store.applied);
    info!("Failed: {}", metrics.store.failed);
    info!("Discarded: {} ({:.1}%)", metrics.store.discarded, metrics.discard_rate() * 100.0);
    info!("Average settle time: {}ms", metrics.average_settle_ms());
    info!(
        "Assertions: {} passed, {} failed",
        metrics.assertions_passed, metrics.assertions_failed
    );

    if !metrics.all_passed() {
        warn!("Some assertions did not hold");
        anyhow::bail!("{} assertion(s) failed", metrics.assertions_failed);
    }

    Ok(())
}
