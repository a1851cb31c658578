//! Main entry point for the ads-stats-fetcher CLI

use ads_stats_fetcher::cli::Cli;
use ads_stats_fetcher::metrics::init_metrics;
use ads_stats_fetcher::Verbosity;
use anyhow::Context;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
///
/// `RUST_LOG` wins over the verbosity flags.
fn init_tracing(verbosity: Verbosity) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_level = match verbosity {
        Verbosity::Normal => "ads_stats_fetcher=info",
        Verbosity::Verbose => "ads_stats_fetcher=debug",
        Verbosity::VeryVerbose => "ads_stats_fetcher=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr).await {
            warn!("Metrics disabled: {}", e);
        }
    }

    cli.execute()
        .await
        .with_context(|| format!("stats run for account {} failed", cli.account))?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbosity());

    if let Err(e) = run(&cli).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
