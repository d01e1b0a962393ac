//! Configuration management commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{OutputFormat, print_formatted, print_success};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Get a specific config value
    Get {
        /// Config key (e.g., "polling.interval_minutes", "display.locale")
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., "polling.interval_minutes", "display.locale")
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[derive(Serialize)]
struct ConfigPathResult {
    path: String,
    exists: bool,
}

pub async fn run(command: ConfigCommands, format: OutputFormat, quiet: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(format).await,
        ConfigCommands::Get { key } => get(&key, format).await,
        ConfigCommands::Set { key, value } => set(&key, &value, quiet).await,
        ConfigCommands::Path => path(format).await,
    }
}

async fn show(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

async fn get(key: &str, format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    let value = get_config_value(&config, key)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", value);
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["api", "base_url"] => Ok(config.api.base_url.clone()),
        ["api", "timeout_secs"] => Ok(config.api.timeout_secs.to_string()),
        ["polling", "interval_minutes"] => Ok(config.polling.interval_minutes.to_string()),
        ["display", "locale"] => Ok(config.display.locale.clone()),
        ["display", "default_country"] => Ok(config
            .display
            .default_country
            .clone()
            .unwrap_or_else(|| "<not set>".to_string())),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

async fn set(key: &str, value: &str, quiet: bool) -> Result<()> {
    let mut config = Config::load()?;

    set_config_value(&mut config, key, value)?;
    config.save()?;

    print_success(&format!("Set {} = {}", key, value), quiet);
    Ok(())
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["api", "base_url"] => {
            reqwest::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("Invalid URL {:?}: {}", value, e))?;
            config.api.base_url = value.to_string();
        }
        ["api", "timeout_secs"] => {
            config.api.timeout_secs = parse_positive(key, value)?;
        }
        ["polling", "interval_minutes"] => {
            let minutes = parse_positive(key, value)?;
            let max = crate::config::max_interval_minutes();
            if minutes > max {
                anyhow::bail!("{} must be at most {} (one week)", key, max);
            }
            config.polling.interval_minutes = minutes;
        }
        ["display", "locale"] => {
            config.display.locale = value.to_string();
        }
        ["display", "default_country"] => {
            // "World" or an empty value means worldwide
            config.display.default_country = crate::cli::parse_scope(value);
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    Ok(())
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let n: u64 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a whole number, got {:?}", key, value))?;
    if n == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(n)
}

async fn path(format: OutputFormat) -> Result<()> {
    let path = Config::config_path()?;
    let exists = path.exists();

    let result = ConfigPathResult {
        path: path.to_string_lossy().to_string(),
        exists,
    };

    print_formatted(&result, format, |r| {
        format!("{}{}", r.path, if r.exists { "" } else { " (not found)" })
    });

    Ok(())
}
