//! CLI module for covidtray
//!
//! The terminal display surface: one-shot commands plus an interactive shell
//! that renders the update stream the way the tray menu would.

mod commands;
mod output;
mod shell;
mod view;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::bus::UpdateBus;
use crate::config::Config;
use crate::orchestrator::{Orchestrator, WORLD_LABEL};
use crate::stats::StatsClient;

pub use output::OutputFormat;

/// Quick COVID-19 stats, kept fresh in the background
#[derive(Parser, Debug)]
#[command(name = "covidtray")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    /// Defaults to the interactive shell
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch stats once and print them
    Stats {
        /// Country to fetch ("world" for worldwide); defaults to the configured country
        #[arg(long)]
        country: Option<String>,
    },

    /// List the selectable scopes
    Countries,

    /// Keep stats fresh and print every update until Ctrl-C
    Watch {
        /// Country to follow ("world" for worldwide)
        #[arg(long)]
        country: Option<String>,

        /// Minutes between refreshes, overriding the config
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Interactive shell with live updates
    Shell,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Stats { country } => commands::stats::run(country, format, quiet).await,
        Commands::Countries => commands::countries::run(format).await,
        Commands::Watch { country, interval } => {
            commands::watch::run(country, interval, format, quiet).await
        }
        Commands::Shell => shell::run().await,
        Commands::Config { command } => commands::config::run(command, format, quiet).await,
    }
}

/// Build the refresh engine for the configured provider
pub fn connect(config: &Config) -> Result<Orchestrator> {
    let client = StatsClient::new(&config.api.base_url, config.request_timeout())?;

    // Outer bound stays above the HTTP timeout so transport errors are reported first
    let fetch_timeout = config.request_timeout() + Duration::from_secs(1);

    Ok(Orchestrator::new(Arc::new(client), UpdateBus::new(), fetch_timeout))
}

/// Interpret user input as a scope: empty or "world" means worldwide
pub fn parse_scope(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case(WORLD_LABEL) {
        None
    } else {
        Some(input.to_string())
    }
}

/// Scope from the command line, falling back to the configured default
fn initial_scope(arg: Option<String>, config: &Config) -> Option<String> {
    match arg {
        Some(arg) => parse_scope(&arg),
        None => config.display.default_country.as_deref().and_then(parse_scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert_eq!(parse_scope(""), None);
        assert_eq!(parse_scope("  World "), None);
        assert_eq!(parse_scope("world"), None);
        assert_eq!(parse_scope(" South Korea "), Some("South Korea".to_string()));
    }

    #[test]
    fn test_initial_scope() {
        let mut config = Config::default();
        config.display.default_country = Some("Narnia".to_string());

        assert_eq!(initial_scope(None, &config), Some("Narnia".to_string()));
        assert_eq!(initial_scope(Some("world".into()), &config), None);
        assert_eq!(
            initial_scope(Some("Neverland".into()), &config),
            Some("Neverland".to_string())
        );
        assert_eq!(initial_scope(None, &Config::default()), None);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["covidtray", "stats", "--country", "Narnia", "--json"]).unwrap();
        assert_eq!(cli.output.format(), OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Some(Commands::Stats { country: Some(ref c) }) if c == "Narnia"
        ));

        let cli = Cli::try_parse_from(["covidtray"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(connect(&config).is_err());
        assert!(connect(&Config::default()).is_ok());
    }
}
