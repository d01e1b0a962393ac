//! One-shot stats fetch

use anyhow::Result;
use serde::Serialize;

use crate::bus::UpdateEvent;
use crate::cli::output::{OutputFormat, print_formatted};
use crate::cli::{connect, initial_scope};
use crate::config::Config;
use crate::format::Formatter;
use crate::stats::StatsSnapshot;

#[derive(Serialize)]
struct StatsResult {
    label: String,
    title: String,
    #[serde(flatten)]
    snapshot: StatsSnapshot,
}

pub async fn run(country: Option<String>, format: OutputFormat, quiet: bool) -> Result<()> {
    let config = Config::load()?;
    let orchestrator = connect(&config)?;
    let fmt = Formatter::new(&config.display.locale);

    let mut updates = orchestrator.subscribe();
    orchestrator.select_country(initial_scope(country, &config));

    let outcome = loop {
        let Some(event) = updates.recv().await else {
            break Err(anyhow::anyhow!("Update stream ended before a result arrived"));
        };
        if !event.is_terminal() {
            continue;
        }

        break match event {
            UpdateEvent::Ready { snapshot, label } => {
                let result = StatsResult {
                    title: fmt.title(&snapshot),
                    label,
                    snapshot,
                };
                print_formatted(&result, format, |r| {
                    if quiet {
                        r.title.clone()
                    } else {
                        format!("{}\n\n{}", r.title, fmt.details(&r.snapshot))
                    }
                });
                Ok(())
            }
            UpdateEvent::Failed { kind, message } => {
                Err(anyhow::anyhow!("{} ({})", message, kind.description()))
            }
            UpdateEvent::Fetching => continue,
        };
    };

    orchestrator.shutdown();
    outcome
}
