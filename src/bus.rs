//! Update distribution to independent subscribers.
//!
//! Every subscriber owns its own unbounded delivery queue, so a slow reader never
//! holds up the publisher or any other reader, and nothing is dropped.
//! Events published while a subscriber is registered arrive in publish order;
//! there is no backlog replay for late subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::stats::{ErrorKind, StatsSnapshot};

/// A state transition broadcast by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// A fetch has started
    Fetching,
    /// A fetch succeeded; `label` is "World" or the selected country
    Ready { snapshot: StatsSnapshot, label: String },
    /// A fetch failed; the previous snapshot, if any, is still the latest good one
    Failed { kind: ErrorKind, message: String },
}

impl UpdateEvent {
    /// True for the events that end a fetch
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateEvent::Fetching)
    }
}

/// Opaque identifier of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Receiving end of a subscription.
///
/// The stream ends once the subscriber is removed or the bus is closed.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<UpdateEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<UpdateEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    sinks: HashMap<SubscriberId, mpsc::UnboundedSender<UpdateEvent>>,
    closed: bool,
}

/// Broadcast registry of subscriber sinks. Clones share the same registry.
#[derive(Clone, Default)]
pub struct UpdateBus {
    registry: Arc<Mutex<Registry>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never panic midway, so a poisoned lock still guards consistent data
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber. It sees only events published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry();

        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;

        // A closed bus hands out already-ended streams
        if !registry.closed {
            registry.sinks.insert(id, tx);
        }
        tracing::debug!(subscriber = id.0, "Subscriber added");

        Subscription { id, rx }
    }

    /// Remove a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry().sinks.remove(&id).is_some() {
            tracing::debug!(subscriber = id.0, "Subscriber removed");
        }
    }

    /// Deliver an event to every registered subscriber. Returns how many received it.
    ///
    /// Sinks whose `Subscription` has been dropped are pruned here.
    pub fn publish(&self, event: UpdateEvent) -> usize {
        let mut registry = self.registry();
        let mut delivered = 0;

        registry.sinks.retain(|id, sink| match sink.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(subscriber = id.0, "Subscriber dropped, pruning");
                false
            }
        });

        delivered
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry().sinks.len()
    }

    /// Drop every sink, ending all subscription streams. Later subscriptions end immediately.
    pub fn close(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        registry.sinks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(label: &str) -> UpdateEvent {
        UpdateEvent::Ready {
            snapshot: StatsSnapshot {
                cases: 1,
                ..Default::default()
            },
            label: label.to_string(),
        }
    }

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let bus = UpdateBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(UpdateEvent::Fetching), 2);
        assert_eq!(bus.publish(ready("World")), 2);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.try_recv(), Some(UpdateEvent::Fetching));
            assert_eq!(sub.try_recv(), Some(ready("World")));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn test_no_backlog_replay() {
        let bus = UpdateBus::new();
        bus.publish(UpdateEvent::Fetching);

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), None);

        bus.publish(ready("Narnia"));
        assert_eq!(late.try_recv(), Some(ready("Narnia")));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = UpdateBus::new();
        let mut sub = bus.subscribe();
        let other = bus.subscribe();
        let id = sub.id();

        bus.unsubscribe(id);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 1);

        bus.unsubscribe(SubscriberId(999));
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.publish(UpdateEvent::Fetching), 1);
        assert_eq!(sub.try_recv(), None);
        drop(other);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let bus = UpdateBus::new();
        let sub = bus.subscribe();
        let _kept = bus.subscribe();
        drop(sub);

        assert_eq!(bus.publish(UpdateEvent::Fetching), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let bus = UpdateBus::new();
        let mut sub = bus.subscribe();
        bus.publish(UpdateEvent::Fetching);
        bus.close();

        // Already queued events still drain before the stream ends
        assert_eq!(sub.recv().await, Some(UpdateEvent::Fetching));
        assert_eq!(sub.recv().await, None);

        let mut after = bus.subscribe();
        assert_eq!(after.recv().await, None);
        assert_eq!(bus.publish(UpdateEvent::Fetching), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let bus = UpdateBus::new();
        let _idle = bus.subscribe();
        let mut active = bus.subscribe();

        for _ in 0..1000 {
            bus.publish(UpdateEvent::Fetching);
        }
        for _ in 0..1000 {
            assert_eq!(active.recv().await, Some(UpdateEvent::Fetching));
        }
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(UpdateEvent::Failed {
            kind: ErrorKind::Decode,
            message: "bad".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["kind"], "decode");
        assert!(ready("World").is_terminal());
        assert!(!UpdateEvent::Fetching.is_terminal());
    }
}
