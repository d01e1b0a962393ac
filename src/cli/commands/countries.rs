//! Scope listing

use anyhow::Result;

use crate::cli::connect;
use crate::cli::output::{OutputFormat, print_error, print_formatted};
use crate::config::Config;
use crate::orchestrator::WORLD_LABEL;

pub async fn run(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let orchestrator = connect(&config)?;

    // Without a country list only worldwide data is selectable
    let names = match orchestrator.list_countries().await {
        Ok(names) => names,
        Err(e) => {
            print_error(&format!("Failed to fetch countries: {}", e));
            Vec::new()
        }
    };

    let mut scopes = Vec::with_capacity(names.len() + 1);
    scopes.push(WORLD_LABEL.to_string());
    scopes.extend(names);

    print_formatted(&scopes, format, |s| s.join("\n"));

    orchestrator.shutdown();
    Ok(())
}
