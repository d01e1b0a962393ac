use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poller;
use crate::stats;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Data provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Provider base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    stats::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    stats::DEFAULT_TIMEOUT.as_secs()
}

/// Background refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Minutes between refreshes
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    poller::DEFAULT_INTERVAL.as_secs() / 60
}

/// Longest polling interval accepted in the config, in minutes
pub fn max_interval_minutes() -> u64 {
    poller::MAX_INTERVAL.as_secs() / 60
}

/// Convert a count of minutes to a duration, saturating instead of overflowing
pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Locale for thousands separators
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Country selected at startup; worldwide when unset
    #[serde(default)]
    pub default_country: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            default_country: None,
        }
    }
}

fn default_locale() -> String {
    "en".to_string()
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "covidtray", "Covidtray")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.sanitize();
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Replace zero durations with defaults and clamp oversized intervals
    fn sanitize(&mut self) {
        if self.api.timeout_secs == 0 {
            tracing::warn!("api.timeout_secs must be positive, using default");
            self.api.timeout_secs = default_timeout_secs();
        }
        if self.polling.interval_minutes == 0 {
            tracing::warn!("polling.interval_minutes must be positive, using default");
            self.polling.interval_minutes = default_interval_minutes();
        } else if self.polling.interval_minutes > max_interval_minutes() {
            tracing::warn!(
                "polling.interval_minutes exceeds {}, clamping",
                max_interval_minutes()
            );
            self.polling.interval_minutes = max_interval_minutes();
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        minutes(self.polling.interval_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://corona.lmao.ninja/v2");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.display.locale, "en");
        assert!(config.display.default_country.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[polling]\ninterval_minutes = 5\n").unwrap();
        assert_eq!(config.polling.interval_minutes, 5);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.display.locale, "en");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.display.default_country = Some("Narnia".to_string());
        config.polling.interval_minutes = 15;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.display.default_country.as_deref(), Some("Narnia"));
        assert_eq!(loaded.poll_interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.polling.interval_minutes, 30);
    }

    #[test]
    fn test_zero_values_are_clamped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\ntimeout_secs = 0\n[polling]\ninterval_minutes = 0\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.polling.interval_minutes, 30);
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let mut config = Config::default();
        config.polling.interval_minutes = u64::MAX;
        assert_eq!(config.poll_interval(), Duration::from_secs(u64::MAX));
        assert_eq!(minutes(2), Duration::from_secs(120));
    }

    #[test]
    fn test_huge_interval_is_clamped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, format!("[polling]\ninterval_minutes = {}\n", i64::MAX)).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.polling.interval_minutes, max_interval_minutes());
        assert_eq!(config.poll_interval(), poller::MAX_INTERVAL);
    }
}
