//! Periodic refresh driver.
//!
//! Fires one refresh immediately, then one every interval until stopped.
//! A failed refresh never stops the timer, and a tick that lands while a
//! fetch is still running is simply a no-op refresh.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;

/// Default time between refreshes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Shortest accepted interval
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(
                "Polling interval {:?} too short, using {:?}",
                interval,
                MIN_INTERVAL
            );
        } else if interval > MAX_INTERVAL {
            tracing::warn!(
                "Polling interval {:?} too long, using {:?}",
                interval,
                MAX_INTERVAL
            );
        }
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the timer loop. It stops on `PollerHandle::stop` or orchestrator shutdown.
    pub fn spawn(self, orchestrator: Orchestrator) -> PollerHandle {
        let token = orchestrator.shutdown_token().child_token();
        let task = tokio::spawn(run(self.interval, orchestrator, token.clone()));
        PollerHandle { token, task }
    }
}

async fn run(interval: Duration, orchestrator: Orchestrator, token: CancellationToken) {
    tracing::info!("Polling every {:?}", interval);

    // First tick completes immediately
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let started = orchestrator.refresh();
                tracing::debug!(started, "Poll tick");
            }
        }
    }

    tracing::info!("Polling stopped");
}

/// Handle to a running poller
pub struct PollerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Ask the timer loop to stop; no further ticks fire
    pub fn stop(&self) {
        self.token.cancel();
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!("Poller task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{UpdateBus, UpdateEvent};
    use crate::orchestrator::tests::FakeApi;
    use crate::stats::{ErrorKind, FetchError};
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(60);

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_secs(1),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_immediately_then_every_interval() {
        let api = FakeApi::new();
        let orch = Orchestrator::new(api.clone(), UpdateBus::new(), Duration::from_secs(10));
        let mut sub = orch.subscribe();
        let start = Instant::now();

        let handle = Poller::new(INTERVAL).spawn(orch.clone());

        for n in 0..4u32 {
            assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));
            assert_near(start.elapsed(), INTERVAL * n);
            assert!(matches!(sub.recv().await, Some(UpdateEvent::Ready { .. })));
        }
        assert_eq!(api.calls().len(), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_timer() {
        let api = FakeApi::new();
        *api.fail_with.lock().unwrap() = Some(FetchError::Fetch("offline".into()));
        let orch = Orchestrator::new(api.clone(), UpdateBus::new(), Duration::from_secs(10));
        let mut sub = orch.subscribe();

        let handle = Poller::new(INTERVAL).spawn(orch.clone());

        for _ in 0..3 {
            assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));
            match sub.recv().await {
                Some(UpdateEvent::Failed { kind, .. }) => assert_eq!(kind, ErrorKind::Fetch),
                other => panic!("expected Failed, got {:?}", other),
            }
        }
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_fetch_are_no_ops() {
        let api = FakeApi::gated();
        let orch = Orchestrator::new(api.clone(), UpdateBus::new(), Duration::from_secs(3600));
        let mut sub = orch.subscribe();

        let handle = Poller::new(INTERVAL).spawn(orch.clone());
        assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));

        // Three more ticks pass while the first fetch is held open
        tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(10)).await;
        assert_eq!(api.calls().len(), 1);
        assert!(sub.try_recv().is_none());

        api.release.notify_one();
        assert!(matches!(sub.recv().await, Some(UpdateEvent::Ready { .. })));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let api = FakeApi::new();
        let orch = Orchestrator::new(api.clone(), UpdateBus::new(), Duration::from_secs(10));
        let mut sub = orch.subscribe();

        let handle = Poller::new(INTERVAL).spawn(orch.clone());
        assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));
        assert!(matches!(sub.recv().await, Some(UpdateEvent::Ready { .. })));

        handle.shutdown().await;
        tokio::time::sleep(INTERVAL * 5).await;
        assert!(sub.try_recv().is_none());
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_shutdown_stops_poller() {
        let orch = Orchestrator::new(FakeApi::new(), UpdateBus::new(), Duration::from_secs(10));
        let handle = Poller::new(INTERVAL).spawn(orch.clone());

        orch.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_running());
    }

    #[test]
    fn test_interval_bounds() {
        assert_eq!(Poller::new(Duration::ZERO).interval(), MIN_INTERVAL);
        assert_eq!(Poller::new(Duration::MAX).interval(), MAX_INTERVAL);
        assert_eq!(Poller::default().interval(), DEFAULT_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_minute_interval_keeps_cadence() {
        let api = FakeApi::new();
        let orch = Orchestrator::new(api.clone(), UpdateBus::new(), Duration::from_secs(10));
        let mut sub = orch.subscribe();
        let start = Instant::now();

        let handle = Poller::new(Duration::from_secs(5)).spawn(orch.clone());

        for n in 0..3u32 {
            assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));
            assert_near(start.elapsed(), Duration::from_secs(5) * n);
            assert!(matches!(sub.recv().await, Some(UpdateEvent::Ready { .. })));
        }

        handle.shutdown().await;
    }
}
