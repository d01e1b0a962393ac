//! Follow the update stream until interrupted

use std::time::Duration;

use anyhow::Result;

use crate::cli::output::{OutputFormat, print_json_line, print_success};
use crate::cli::view::TrayView;
use crate::cli::{connect, initial_scope};
use crate::config::{Config, minutes};
use crate::format::Formatter;
use crate::poller::Poller;

/// Interval from `--interval` minutes, falling back to the config
fn watch_interval(arg: Option<u64>, config: &Config) -> Result<Duration> {
    match arg {
        Some(0) => anyhow::bail!("--interval must be greater than zero"),
        Some(n) => Ok(minutes(n)),
        None => Ok(config.poll_interval()),
    }
}

pub async fn run(
    country: Option<String>,
    interval_minutes: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let config = Config::load()?;
    let orchestrator = connect(&config)?;
    let mut view = TrayView::new(Formatter::new(&config.display.locale));

    let interval = watch_interval(interval_minutes, &config)?;

    let mut updates = orchestrator.subscribe();

    // Select before the poller starts; its first tick is then a no-op while this fetch runs
    if let Some(country) = initial_scope(country, &config) {
        orchestrator.select_country(Some(country));
    }
    let poller = Poller::new(interval);
    print_success(
        &format!(
            "Refreshing every {:?}, press Ctrl-C to stop",
            poller.interval()
        ),
        quiet || format == OutputFormat::Json,
    );
    let poller = poller.spawn(orchestrator.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = updates.recv() => {
                let Some(event) = event else { break };
                match format {
                    OutputFormat::Json => print_json_line(&event),
                    OutputFormat::Text => {
                        view.apply(&event);
                        println!("{}\n", view.render());
                    }
                }
            }
        }
    }

    tracing::debug!("Stopping watch");
    poller.shutdown().await;
    orchestrator.bus().unsubscribe(updates.id());
    orchestrator.shutdown();
    Ok(())
}
