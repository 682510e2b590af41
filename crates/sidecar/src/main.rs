//! Liquidity pricing replay
//!
//! Replays a recorded block sequence through the pricing pipeline and prints
//! the resulting token valuations and pool capitalizations as JSON.

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use liqcap_sidecar::telemetry::init_tracing;
use liqcap_sidecar::{Replay, Scenario, SidecarConfig};

#[derive(Debug, Parser)]
#[command(name = "liqcap-replay", version, about = "Replay blocks through the liquidity pricing pipeline")]
struct Args {
    /// Scenario JSON file
    #[arg(long)]
    scenario: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = SidecarConfig::load(args.config.as_deref())?;
    init_tracing(&config.log_filter);
    liqcap_scheduler::metrics::describe_metrics();

    info!("Starting liqcap-replay v{}", env!("CARGO_PKG_VERSION"));

    let scenario = Scenario::from_path(&args.scenario)?;
    info!(
        blocks = scenario.blocks.len(),
        quote_denom = %config.pricing.default_quote_denom,
        mode = ?config.scheduler.mode,
        "Loaded scenario"
    );

    let replay = Replay::new(&config, &scenario)?;

    tokio::select! {
        result = replay.run(scenario.blocks) => {
            if let Err(e) = result {
                error!("Replay failed: {:#}", e);
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Replay interrupted, reporting partial state");
        }
    }

    let report = replay.report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}
