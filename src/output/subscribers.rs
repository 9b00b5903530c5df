use crate::record::Ack;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Per-source acknowledgement subscriptions.
///
/// Subscribe, unsubscribe and routing all happen under one internal
/// lock, so an ack is never routed to a channel mid-removal. The lock is
/// only held for the map operation; delivery is a single non-blocking
/// `try_send`.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<String, mpsc::Sender<Ack>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription for a source and return its ack receiver.
    pub fn subscribe(&self, source: &str) -> mpsc::Receiver<Ack> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers
            .lock()
            .unwrap()
            .insert(source.to_string(), tx);
        rx
    }

    pub fn unsubscribe(&self, source: &str) {
        self.subscribers.lock().unwrap().remove(source);
    }

    /// Deliver an ack to the subscription for its source. Best-effort:
    /// if no subscription exists or the subscriber is not ready to
    /// receive, the ack is dropped and logged. The tailer re-derives its
    /// position from the offset registry on next startup.
    pub fn route(&self, ack: Ack) {
        let subscribers = self.subscribers.lock().unwrap();
        match subscribers.get(&ack.record.source) {
            Some(tx) => {
                if tx.try_send(ack.clone()).is_err() {
                    warn!(
                        source = %ack.record.source,
                        offset = ack.record.offset,
                        "dropped ack, subscriber not receiving"
                    );
                }
            }
            None => {
                warn!(
                    source = %ack.record.source,
                    offset = ack.record.offset,
                    "dropped ack, no subscriber"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn ack_for(source: &str) -> Ack {
        Ack::new(Record::new(source, 1, 0, r#"{"a":1}"#), false)
    }

    #[tokio::test]
    async fn routes_ack_to_matching_source() {
        let registry = SubscriberRegistry::new();
        let mut rx = registry.subscribe("/var/log/a.log");

        registry.route(ack_for("/var/log/a.log"));

        let ack = rx.recv().await.unwrap();
        assert_eq!(ack.record.source, "/var/log/a.log");
    }

    #[tokio::test]
    async fn never_routes_to_another_source() {
        let registry = SubscriberRegistry::new();
        let mut rx_a = registry.subscribe("/var/log/a.log");
        let mut rx_b = registry.subscribe("/var/log/b.log");

        registry.route(ack_for("/var/log/a.log"));

        assert_eq!(rx_a.recv().await.unwrap().record.source, "/var/log/a.log");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn drops_ack_without_subscriber() {
        let registry = SubscriberRegistry::new();
        // No panic, nothing delivered anywhere.
        registry.route(ack_for("/var/log/unknown.log"));
    }

    #[tokio::test]
    async fn drops_ack_when_receiver_gone() {
        let registry = SubscriberRegistry::new();
        let rx = registry.subscribe("/var/log/a.log");
        drop(rx);

        registry.route(ack_for("/var/log/a.log"));

        // A fresh subscription sees nothing from the dropped delivery.
        let mut rx = registry.subscribe("/var/log/a.log");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscription() {
        let registry = SubscriberRegistry::new();
        let mut rx = registry.subscribe("/var/log/a.log");
        registry.unsubscribe("/var/log/a.log");

        registry.route(ack_for("/var/log/a.log"));
        assert!(rx.try_recv().is_err());
    }
}
