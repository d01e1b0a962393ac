mod bus;
mod cli;
mod config;
mod format;
mod orchestrator;
mod poller;
mod stats;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let default_filter = if cli.output.verbose {
        "covidtray=debug,info"
    } else if cli.output.quiet {
        "warn"
    } else {
        "covidtray=info,warn"
    };

    // Initialize logging; stdout stays reserved for command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting covidtray v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}
