//! Refresh orchestration.
//!
//! The `Orchestrator` is the single owner of the selected scope and of the
//! in-flight flag. At most one fetch runs at a time: a `refresh` that finds a
//! fetch already running is a no-op and publishes nothing. Every fetch that
//! does start publishes `Fetching` followed by exactly one terminal event
//! (`Ready` or `Failed`), unless the orchestrator is shut down mid-fetch.
//!
//! Selecting a country while a fetch is in flight records the selection and
//! queues one coalesced follow-up fetch, which starts as soon as the running
//! one has published its terminal event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::{Subscription, UpdateBus, UpdateEvent};
use crate::stats::{FetchError, StatsApi, StatsSnapshot};

/// Display label for the worldwide scope
pub const WORLD_LABEL: &str = "World";

#[derive(Debug, Default)]
struct RefreshState {
    /// Selected country; `None` means worldwide
    selection: Option<String>,
    /// A fetch is in flight
    fetching: bool,
    /// A selection changed while fetching; fetch again once the current one settles
    pending: bool,
}

struct Inner {
    api: Arc<dyn StatsApi>,
    bus: UpdateBus,
    state: Mutex<RefreshState>,
    fetch_timeout: Duration,
    shutdown: CancellationToken,
}

/// Shared handle to the refresh engine. Clones drive the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator publishing to `bus`.
    ///
    /// `fetch_timeout` bounds every provider call so a stalled request cannot
    /// keep the in-flight flag set.
    pub fn new(api: Arc<dyn StatsApi>, bus: UpdateBus, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                bus,
                state: Mutex::new(RefreshState::default()),
                fetch_timeout,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.inner.bus
    }

    /// Subscribe to the update stream
    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    /// Currently selected country, `None` for worldwide
    pub fn selection(&self) -> Option<String> {
        self.state().selection.clone()
    }

    /// Whether a fetch is in flight
    pub fn is_fetching(&self) -> bool {
        self.state().fetching
    }

    /// Token cancelled by `shutdown`; long-lived tasks derive child tokens from it
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fetch the provider's country names, in provider order.
    ///
    /// Callers that want a "World" entry prepend it themselves.
    pub async fn list_countries(&self) -> Result<Vec<String>, FetchError> {
        tracing::info!("Fetching countries...");

        let countries = tokio::time::timeout(self.inner.fetch_timeout, self.inner.api.fetch_countries())
            .await
            .map_err(|_| self.timeout_error())??;

        let names: Vec<String> = countries.into_iter().map(|c| c.country).collect();
        tracing::info!("Fetched {} countries", names.len());
        Ok(names)
    }

    /// Select the scope to fetch and trigger a refresh.
    ///
    /// `None` or an empty name selects worldwide data. If a fetch is already
    /// running it is left alone and a follow-up fetch for the new scope is queued.
    /// Returns true if a fetch was started by this call.
    pub fn select_country(&self, name: Option<String>) -> bool {
        let name = name.filter(|n| !n.trim().is_empty());
        tracing::info!(
            "Country: {} selected",
            name.as_deref().unwrap_or(WORLD_LABEL)
        );

        let scope = {
            let mut state = self.state();
            state.selection = name;

            if self.is_shut_down() {
                return false;
            }
            if state.fetching {
                tracing::debug!("Fetch in flight, queueing follow-up for new selection");
                state.pending = true;
                return false;
            }

            state.fetching = true;
            state.selection.clone()
        };

        self.start(scope);
        true
    }

    /// Start a fetch for the current selection unless one is already running.
    ///
    /// Returns immediately; the outcome arrives on the update stream.
    /// Returns true if a fetch was started by this call.
    pub fn refresh(&self) -> bool {
        let scope = {
            let mut state = self.state();
            if self.is_shut_down() {
                return false;
            }
            if state.fetching {
                tracing::debug!("Fetch already in flight, skipping refresh");
                return false;
            }

            state.fetching = true;
            state.selection.clone()
        };

        self.start(scope);
        true
    }

    /// Stop background work and end every subscription stream.
    ///
    /// A fetch in flight is abandoned without a terminal event.
    pub fn shutdown(&self) {
        tracing::info!(
            subscribers = self.inner.bus.subscriber_count(),
            "Shutting down refresh orchestration"
        );
        self.inner.shutdown.cancel();
        self.state().pending = false;
        self.inner.bus.close();
    }

    /// Publish `Fetching` and run the fetch on a background task.
    /// Caller must have set `fetching` under the state lock.
    fn start(&self, scope: Option<String>) {
        self.inner.bus.publish(UpdateEvent::Fetching);

        let this = self.clone();
        tokio::spawn(async move { this.run(scope).await });
    }

    async fn run(&self, mut scope: Option<String>) {
        loop {
            let label = scope.as_deref().unwrap_or(WORLD_LABEL).to_string();
            tracing::info!("Fetching data for {}...", label);

            let Some(result) = self.fetch(scope.as_deref()).await else {
                tracing::debug!("Fetch for {} abandoned on shutdown", label);
                self.state().fetching = false;
                return;
            };

            let event = match result {
                Ok(snapshot) => {
                    tracing::info!(
                        "Data fetched for {}: {} cases, {} active",
                        label,
                        snapshot.cases,
                        snapshot.active
                    );
                    UpdateEvent::Ready { snapshot, label }
                }
                Err(e) => {
                    tracing::warn!(kind = %e.kind(), "Fetch for {} failed: {}", label, e);
                    UpdateEvent::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };

            // Terminal event goes out while `fetching` is still held, so no other
            // fetch can publish in between
            self.inner.bus.publish(event);

            let mut state = self.state();
            if state.pending && !self.is_shut_down() {
                state.pending = false;
                scope = state.selection.clone();
                drop(state);
                self.inner.bus.publish(UpdateEvent::Fetching);
                continue;
            }

            state.pending = false;
            state.fetching = false;
            return;
        }
    }

    /// One provider call for `scope`, bounded by the fetch timeout.
    ///
    /// The call runs on its own task so a panicking provider is reported as a
    /// failure instead of taking the in-flight flag down with it. Returns `None`
    /// if shutdown interrupts the call, which is then aborted.
    async fn fetch(&self, scope: Option<&str>) -> Option<Result<StatsSnapshot, FetchError>> {
        let api = Arc::clone(&self.inner.api);
        let scope = scope.map(str::to_owned);

        let mut call = tokio::spawn(async move {
            match scope.as_deref() {
                Some(name) => api.fetch_for_country(name).await,
                None => api.fetch_worldwide().await,
            }
        });

        let outcome = tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => {
                call.abort();
                return None;
            }
            outcome = tokio::time::timeout(self.inner.fetch_timeout, &mut call) => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(FetchError::Fetch(format!("fetch task failed: {}", e))),
            Err(_) => {
                call.abort();
                Err(self.timeout_error())
            }
        };

        Some(result.and_then(|snapshot| {
            if snapshot.is_empty() {
                Err(FetchError::Empty)
            } else {
                Ok(snapshot)
            }
        }))
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::Fetch(format!(
            "request timed out after {:.1}s",
            self.inner.fetch_timeout.as_secs_f32()
        ))
    }
}
