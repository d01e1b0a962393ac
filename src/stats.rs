//! Statistics provider client.
//!
//! This module provides:
//!
//! - `StatsApi`: the capability the orchestrator fetches through
//! - `StatsClient`: the reqwest-backed implementation talking to the provider
//! - `StatsSnapshot` and `Country`: deserialized provider responses
//! - `FetchError` and `ErrorKind`: the failure taxonomy surfaced to subscribers
//!
//! Worldwide data comes from `/all`, per-country data from `/countries/{name}`
//! and the list of known countries from `/countries`.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default provider base URL
pub const DEFAULT_BASE_URL: &str = "https://corona.lmao.ninja/v2";

/// Default timeout for a single provider request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent for API requests
const USER_AGENT: &str = concat!("covidtray/", env!("CARGO_PKG_VERSION"));

/// Classification of a failed fetch, carried by `UpdateEvent::Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request could not complete (network, transport, timeout, HTTP status)
    Fetch,
    /// A response arrived but did not have the expected shape
    Decode,
    /// The response parsed but carried no usable data
    Empty,
}

impl ErrorKind {
    /// Get a human-readable description of the failure class
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "could not reach the data provider",
            ErrorKind::Decode => "unexpected response from the data provider",
            ErrorKind::Empty => "the data provider returned no data",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Decode => "decode",
            ErrorKind::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while talking to the provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to fetch data: {0}")]
    Fetch(String),

    #[error("Failed to decode JSON response: {0}")]
    Decode(String),

    #[error("Empty response")]
    Empty,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Fetch(_) => ErrorKind::Fetch,
            FetchError::Decode(_) => ErrorKind::Decode,
            FetchError::Empty => ErrorKind::Empty,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Fetch(e.to_string())
        }
    }
}

/// Aggregate statistics, either worldwide or for one country.
///
/// Only `updated`, `cases`, `deaths`, `recovered`, `active` and `country`
/// drive the display; the remaining counters are kept for detail views.
/// Unknown fields in the payload are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Timestamp of the provider's last data update in milliseconds
    #[serde(rename = "updated", default)]
    pub updated_at_millis: i64,
    #[serde(default)]
    pub cases: i64,
    #[serde(default)]
    pub today_cases: i64,
    #[serde(default)]
    pub deaths: i64,
    #[serde(default)]
    pub today_deaths: i64,
    #[serde(default)]
    pub recovered: i64,
    #[serde(default)]
    pub active: i64,
    #[serde(default)]
    pub critical: i64,
    #[serde(default)]
    pub tests: i64,
    /// Country the dataset is for; absent for worldwide data
    #[serde(rename = "country", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl StatsSnapshot {
    /// Country name, or "World" when the snapshot is worldwide
    pub fn scope_label(&self) -> &str {
        match self.scope.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => crate::orchestrator::WORLD_LABEL,
        }
    }

    /// True for placeholder payloads: no timestamp and every headline counter at zero
    pub fn is_empty(&self) -> bool {
        self.updated_at_millis == 0
            && self.cases == 0
            && self.deaths == 0
            && self.recovered == 0
            && self.active == 0
    }

    /// Provider update time as a UTC timestamp
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.updated_at_millis).filter(|_| self.updated_at_millis > 0)
    }
}

/// An entry of the provider's country list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Country {
    pub country: String,
}

/// Read access to the statistics provider.
///
/// Implementations must be cheap to share; the orchestrator holds one behind an `Arc`
/// and may call it from spawned tasks.
pub trait StatsApi: Send + Sync {
    /// Fetch every country the provider knows about, in provider order
    fn fetch_countries(&self) -> BoxFuture<'_, Result<Vec<Country>, FetchError>>;

    /// Fetch worldwide totals
    fn fetch_worldwide(&self) -> BoxFuture<'_, Result<StatsSnapshot, FetchError>>;

    /// Fetch totals for a single country
    fn fetch_for_country<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, Result<StatsSnapshot, FetchError>>;
}

/// HTTP implementation of `StatsApi`
#[derive(Clone)]
pub struct StatsClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl StatsClient {
    /// Create a client for the given base URL with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid API base URL {:?}: {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", base_url);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Build the URL for an endpoint below the base URL.
    ///
    /// Segments are percent-encoded, so country names with spaces or slashes are safe.
    pub fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FetchError> {
        let url = self.endpoint(segments);
        tracing::debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Fetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let body = response.bytes().await?;
        decode(&body)
    }
}

impl StatsApi for StatsClient {
    fn fetch_countries(&self) -> BoxFuture<'_, Result<Vec<Country>, FetchError>> {
        self.get_json(&["countries"]).boxed()
    }

    fn fetch_worldwide(&self) -> BoxFuture<'_, Result<StatsSnapshot, FetchError>> {
        self.get_json(&["all"]).boxed()
    }

    fn fetch_for_country<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<StatsSnapshot, FetchError>> {
        async move {
            let mut snapshot: StatsSnapshot = self.get_json(&["countries", name]).await?;
            if snapshot.scope.as_deref().is_none_or(str::is_empty) {
                snapshot.scope = Some(name.to_string());
            }
            Ok(snapshot)
        }
        .boxed()
    }
}

/// Decode a JSON response body
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))
}
