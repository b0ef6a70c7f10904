//! In-process pub/sub bus.
//!
//! Subjects are created on first use and carry serialized delta messages.
//! FIFO per subject, at-most-once: a payload published with no live
//! subscribers is dropped, and a subscriber that falls behind its buffer
//! sees the lag instead of silently missing messages.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::ports::{BusError, BusPort, BusSubscription};

/// Per-subject buffer; a subscriber further behind than this is lagged and
/// must resync via a fresh AOI.
const SUBJECT_BUFFER: usize = 256;

/// Process-wide bus over tokio broadcast channels.
pub struct InMemoryBus {
    subjects: DashMap<String, broadcast::Sender<String>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            subjects: DashMap::new(),
        }
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<String> {
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(SUBJECT_BUFFER).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusPort for InMemoryBus {
    async fn publish(&self, subject: &str, payload: String) -> Result<(), BusError> {
        match self.subjects.get(subject) {
            Some(sender) => {
                // A send error only means nobody is subscribed right now.
                let receivers = sender.send(payload).unwrap_or(0);
                tracing::trace!(subject = %subject, receivers, "Published");
                Ok(())
            }
            None => {
                tracing::trace!(subject = %subject, "Published with no subject (dropped)");
                Ok(())
            }
        }
    }

    fn subscribe(&self, subject: &str) -> BusSubscription {
        BusSubscription::new(self.sender(subject).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::SubscriptionClosed;

    #[tokio::test]
    async fn subscriber_receives_published_payloads_in_order() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("world.updates.user.alice");

        bus.publish("world.updates.user.alice", "one".into())
            .await
            .expect("publish");
        bus.publish("world.updates.user.alice", "two".into())
            .await
            .expect("publish");

        assert_eq!(sub.next().await.expect("payload"), "one");
        assert_eq!(sub.next().await.expect("payload"), "two");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped_not_an_error() {
        let bus = InMemoryBus::new();
        bus.publish("world.updates.user.nobody", "lost".into())
            .await
            .expect("publish should not fail");
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let bus = InMemoryBus::new();
        let mut alice = bus.subscribe("world.updates.user.alice");
        let _bob = bus.subscribe("world.updates.user.bob");

        bus.publish("world.updates.user.bob", "for bob".into())
            .await
            .expect("publish");
        bus.publish("world.updates.user.alice", "for alice".into())
            .await
            .expect("publish");

        assert_eq!(sub_next(&mut alice).await, "for alice");
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("world.updates.user.slow");
        for i in 0..(SUBJECT_BUFFER + 8) {
            bus.publish("world.updates.user.slow", format!("{i}"))
                .await
                .expect("publish");
        }
        match sub.next().await {
            Err(SubscriptionClosed::Lagged(missed)) => assert!(missed > 0),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    async fn sub_next(sub: &mut crate::infrastructure::ports::BusSubscription) -> String {
        sub.next().await.expect("payload")
    }
}
