//! Subscriber handles: the per-client end of the push channel.

use crate::core::StatusEvent;
use crate::hub::HubInner;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A status event tagged with its position in the hub's publish order.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub seq: u64,
    pub event: StatusEvent,
}

/// Why a push to a subscriber failed. Either way the subscriber is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The subscriber's buffer was full; the new event was dropped
    Overflow,
    /// The receiving side is gone
    Disconnected,
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryFailure::Overflow => write!(f, "subscriber buffer overflow"),
            DeliveryFailure::Disconnected => write!(f, "subscriber disconnected"),
        }
    }
}

impl std::error::Error for DeliveryFailure {}

/// A live subscription to the event hub.
///
/// Dropping the handle unsubscribes it. If the hub evicts the subscriber,
/// [`Subscriber::recv`] drains what is buffered and then returns `None`.
pub struct Subscriber {
    id: SubscriberId,
    receiver: mpsc::Receiver<Delivery>,
    hub: Weak<HubInner>,
}

impl Subscriber {
    pub(crate) fn new(
        id: SubscriberId,
        receiver: mpsc::Receiver<Delivery>,
        hub: Weak<HubInner>,
    ) -> Self {
        Self { id, receiver, hub }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    /// Turn the subscription into a stream that ends on eviction.
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send + 'static {
        stream::unfold(self, |mut subscriber| async move {
            let delivery = subscriber.recv().await?;
            Some((delivery, subscriber))
        })
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}
