//! In-process fan-out of status transitions.
//!
//! # Architecture
//!
//! ```text
//! pipeline ──publish──▶ dispatch queue ──▶ Dispatcher ──try_send──▶ subscriber buffers
//!  (machine lock held)     (unbounded)      (one task)     (bounded, evict on overflow)
//! ```
//!
//! Publishing only enqueues, so a machine's lock is never held across the
//! fan-out. The queue is FIFO and drained by a single task, which keeps every
//! subscriber's view of one machine in production order.

mod subscriber;

pub use subscriber::{Delivery, DeliveryFailure, Subscriber, SubscriberId};

use crate::config::duration_serde;
use crate::core::StatusEvent;
use crate::stats::SharedHubStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Event hub and streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events buffered per subscriber before it is evicted
    pub subscriber_buffer: usize,
    /// Interval between keep-alive comments on idle streams
    #[serde(with = "duration_serde")]
    pub keep_alive: Duration,
    /// Reconnect delay suggested to clients
    #[serde(with = "duration_serde")]
    pub retry: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            keep_alive: Duration::from_secs(5),
            retry: Duration::from_secs(10),
        }
    }
}

struct Registration {
    sender: mpsc::Sender<Delivery>,
    /// First sequence number this subscriber may see
    joined_at: u64,
}

pub(crate) struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, Registration>>,
    next_seq: AtomicU64,
    buffer: usize,
    stats: SharedHubStats,
}

impl HubInner {
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(subscriber = %id, "Subscriber left");
        }
        removed
    }

    /// Push one event to every subscriber that joined before it was published.
    fn deliver(&self, seq: u64, event: &StatusEvent) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, registration) in subscribers.iter() {
            if seq < registration.joined_at {
                continue;
            }
            let delivery = Delivery {
                seq,
                event: event.clone(),
            };
            match registration.sender.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((*id, DeliveryFailure::Overflow)),
                Err(TrySendError::Closed(_)) => failed.push((*id, DeliveryFailure::Disconnected)),
            }
        }

        for (id, failure) in failed {
            subscribers.remove(&id);
            self.stats.record_subscriber_evicted();
            match failure {
                DeliveryFailure::Overflow => {
                    tracing::warn!(subscriber = %id, "Evicting subscriber: {}", failure)
                }
                DeliveryFailure::Disconnected => {
                    tracing::debug!(subscriber = %id, "Evicting subscriber: {}", failure)
                }
            }
        }

        self.stats.record_deliveries(delivered as u64);
        delivered
    }
}

/// Handle for publishing transitions and managing subscribers.
///
/// Cheap to clone; all clones share one subscriber set and one dispatch queue.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
    dispatch_tx: mpsc::UnboundedSender<(u64, StatusEvent)>,
}

impl EventHub {
    /// Create a hub and the dispatcher that must be driven for events to flow.
    pub fn new(config: &HubConfig, stats: SharedHubStats) -> (Self, Dispatcher) {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(HubInner {
            subscribers: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            buffer: config.subscriber_buffer.max(1),
            stats,
        });
        let dispatcher = Dispatcher {
            inner: Arc::clone(&inner),
            dispatch_rx,
        };
        (Self { inner, dispatch_tx }, dispatcher)
    }

    /// Create a hub with its dispatcher running on the current tokio runtime.
    pub fn spawn(config: &HubConfig, stats: SharedHubStats) -> Self {
        let (hub, dispatcher) = Self::new(config, stats);
        tokio::spawn(dispatcher.run());
        hub
    }

    /// Register a new subscriber. It only sees events published from now on.
    pub fn subscribe(&self) -> Subscriber {
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let id = SubscriberId::new();

        {
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let joined_at = self.inner.next_seq.load(Ordering::SeqCst);
            subscribers.insert(id, Registration { sender, joined_at });
        }

        self.inner.stats.record_subscriber_joined();
        tracing::debug!(subscriber = %id, "Subscriber joined");
        Subscriber::new(id, receiver, Arc::downgrade(&self.inner))
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Queue an event for delivery to all current subscribers. Never blocks.
    pub fn publish(&self, event: StatusEvent) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        if self.dispatch_tx.send((seq, event)).is_err() {
            tracing::warn!("Dispatcher has stopped; dropping status event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drains the dispatch queue and fans events out to subscribers.
pub struct Dispatcher {
    inner: Arc<HubInner>,
    dispatch_rx: mpsc::UnboundedReceiver<(u64, StatusEvent)>,
}

impl Dispatcher {
    /// Run until every [`EventHub`] handle has been dropped.
    pub async fn run(mut self) {
        while let Some((seq, event)) = self.dispatch_rx.recv().await {
            let delivered = self.inner.deliver(seq, &event);
            tracing::debug!(
                machine_id = %event.machine_id,
                status = event.status,
                delivered,
                "Dispatched status event"
            );
        }
        tracing::debug!("Dispatcher stopped");
    }

    /// Deliver everything currently queued without waiting for more.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok((seq, event)) = self.dispatch_rx.try_recv() {
            self.inner.deliver(seq, &event);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::HubStats;
    use tokio::time::{timeout, Duration};

    fn event(id: &str, status: bool) -> StatusEvent {
        StatusEvent {
            machine_id: id.to_string(),
            status,
        }
    }

    fn hub_with_buffer(buffer: usize) -> (EventHub, Dispatcher, SharedHubStats) {
        let stats = Arc::new(HubStats::new());
        let config = HubConfig {
            subscriber_buffer: buffer,
            ..Default::default()
        };
        let (hub, dispatcher) = EventHub::new(&config, Arc::clone(&stats));
        (hub, dispatcher, stats)
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let (hub, mut dispatcher, _) = hub_with_buffer(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(event("M1", true));
        dispatcher.dispatch_pending();

        assert_eq!(a.try_recv().unwrap().event, event("M1", true));
        assert_eq!(b.try_recv().unwrap().event, event("M1", true));
    }

    #[test]
    fn test_no_backlog_for_late_subscriber() {
        let (hub, mut dispatcher, _) = hub_with_buffer(8);
        let mut early = hub.subscribe();

        hub.publish(event("M1", true));
        // Joins after the publish but before dispatch
        let mut late = hub.subscribe();
        dispatcher.dispatch_pending();

        assert!(early.try_recv().is_some());
        assert!(late.try_recv().is_none());

        hub.publish(event("M1", false));
        dispatcher.dispatch_pending();
        assert_eq!(late.try_recv().unwrap().event, event("M1", false));
    }

    #[test]
    fn test_order_preserved_per_subscriber() {
        let (hub, mut dispatcher, _) = hub_with_buffer(16);
        let mut sub = hub.subscribe();

        let sequence = [true, false, true, false, true];
        for &status in &sequence {
            hub.publish(event("M1", status));
        }
        dispatcher.dispatch_pending();

        let received: Vec<bool> = std::iter::from_fn(|| sub.try_recv())
            .map(|d| d.event.status)
            .collect();
        assert_eq!(received, sequence);
    }

    #[test]
    fn test_overflowing_subscriber_is_evicted() {
        let (hub, mut dispatcher, stats) = hub_with_buffer(1);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish(event("M1", true));
        dispatcher.dispatch_pending();
        assert!(fast.try_recv().is_some());

        // `slow` never drained its single slot
        hub.publish(event("M1", false));
        dispatcher.dispatch_pending();

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(stats.stats().subscribers_evicted, 1);
        assert_eq!(fast.try_recv().unwrap().event, event("M1", false));

        // The slow subscriber keeps what it had, then sees the end
        assert_eq!(slow.try_recv().unwrap().event, event("M1", true));
        assert!(slow.try_recv().is_none());

        hub.publish(event("M2", true));
        assert_eq!(dispatcher.dispatch_pending(), 1);
        assert_eq!(fast.try_recv().unwrap().event, event("M2", true));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (hub, _dispatcher, _) = hub_with_buffer(8);
        let sub = hub.subscribe();
        let id = sub.id();
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.unsubscribe(id));
    }

    #[test]
    fn test_explicit_unsubscribe_ends_stream() {
        let (hub, mut dispatcher, _) = hub_with_buffer(8);
        let mut sub = hub.subscribe();

        assert!(hub.unsubscribe(sub.id()));
        hub.publish(event("M1", true));
        dispatcher.dispatch_pending();

        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_delivers() {
        let stats = Arc::new(HubStats::new());
        let hub = EventHub::spawn(&HubConfig::default(), Arc::clone(&stats));
        let mut sub = hub.subscribe();

        hub.publish(event("dryer-1", true));

        let delivery = timeout(Duration::from_millis(500), sub.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Subscription closed");
        assert_eq!(delivery.event, event("dryer-1", true));
        assert_eq!(stats.stats().events_delivered, 1);
    }

    #[tokio::test]
    async fn test_stream_ends_after_eviction() {
        use futures::StreamExt;

        let (hub, mut dispatcher, _) = hub_with_buffer(8);
        let sub = hub.subscribe();
        let id = sub.id();
        let mut stream = Box::pin(sub.into_stream());

        hub.publish(event("M1", true));
        dispatcher.dispatch_pending();
        hub.unsubscribe(id);

        assert_eq!(stream.next().await.unwrap().event, event("M1", true));
        assert!(stream.next().await.is_none());
    }
}
