//! In-process publish/subscribe bus
//!
//! Carries the toll network's topic traffic between services running in one
//! process. The broker a production deployment would use (TLS sockets,
//! connection pooling) is an external collaborator; every service here is
//! written against this handle, which is also what the tests drive.
//!
//! Filters use the usual wildcard syntax: `+` matches exactly one segment,
//! a trailing `#` matches the rest of the topic. Each subscriber gets its
//! own channel; delivery is per-subscriber ordered, with no ordering
//! guarantee across topics or subscribers.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Quality-of-service level carried on every publish (at-least-once)
pub const QOS_AT_LEAST_ONCE: u8 = 1;

/// Subscriber channel depth
const CHANNEL_CAPACITY: usize = 64;

/// One message as seen by a subscriber
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
}

struct Subscription {
    filter: String,
    tx: mpsc::Sender<Delivery>,
}

/// Clone-able bus handle; all clones share the same subscription table
#[derive(Clone)]
pub struct MessageBus {
    subs: Arc<RwLock<Vec<Subscription>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a subscription and return its receiving end.
    ///
    /// Messages published before the subscription exist are not replayed.
    pub fn subscribe(&self, filter: &str) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.subs.write().push(Subscription {
            filter: filter.to_string(),
            tx,
        });
        debug!("Subscribed: {}", filter);
        rx
    }

    /// Publish a payload to every subscriber whose filter matches.
    ///
    /// The qos argument mirrors the wire contract (level 1, at-least-once);
    /// in-process fan-out delivers once per live subscriber. Returns how
    /// many subscribers the message reached.
    pub async fn publish(&self, topic: &str, payload: String, _qos: u8) -> usize {
        let targets: Vec<mpsc::Sender<Delivery>> = {
            let subs = self.subs.read();
            subs.iter()
                .filter(|s| topic_matches(&s.filter, topic))
                .map(|s| s.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        let mut saw_closed = false;
        for tx in targets {
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if tx.send(delivery).await.is_ok() {
                delivered += 1;
            } else {
                saw_closed = true;
            }
        }

        if saw_closed {
            self.subs.write().retain(|s| !s.tx.is_closed());
        }

        debug!("Published {} -> {} subscriber(s)", topic, delivered);
        delivered
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subs.read().len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Match a topic against a subscription filter.
///
/// `+` matches exactly one segment; `#` (only meaningful as the last filter
/// segment) matches any remainder, including an empty one.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/').peekable();
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches(
            "highway/+/entry/+/commands",
            "highway/MI/entry/manual/commands"
        ));
        assert!(topic_matches(
            "highway/+/entry/+/commands",
            "highway/TO/entry/telepass/commands"
        ));
        assert!(!topic_matches(
            "highway/+/entry/+/commands",
            "highway/MI/exit/manual/commands"
        ));
        assert!(!topic_matches(
            "highway/+/entry/+/commands",
            "highway/MI/entry/manual/events"
        ));

        // exact filters
        assert!(topic_matches(
            "highway/requests/tollprice",
            "highway/requests/tollprice"
        ));
        assert!(!topic_matches(
            "highway/requests/tollprice",
            "highway/requests/other"
        ));

        // `+` is exactly one segment
        assert!(!topic_matches("highway/+", "highway/MI/entry"));

        // trailing `#` takes the rest
        assert!(topic_matches("highway/#", "highway/MI/entry/manual/commands"));
        assert!(topic_matches("highway/MI/#", "highway/MI/exit/manual/state"));
        assert!(!topic_matches("highway/TO/#", "highway/MI/exit/manual/state"));
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let bus = MessageBus::new();
        let mut commands = bus.subscribe("highway/+/entry/+/commands");
        let mut events = bus.subscribe("highway/+/entry/+/events");

        let n = bus
            .publish(
                "highway/MI/entry/manual/commands",
                r#"{"type":"REQUEST_ENTRY"}"#.to_string(),
                QOS_AT_LEAST_ONCE,
            )
            .await;
        assert_eq!(n, 1);

        let got = commands.recv().await.unwrap();
        assert_eq!(got.topic, "highway/MI/entry/manual/commands");
        assert!(got.payload.contains("REQUEST_ENTRY"));

        // the events subscriber saw nothing
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let bus = MessageBus::new();
        let rx = bus.subscribe("highway/#");
        assert_eq!(bus.subscription_count(), 1);
        drop(rx);

        let n = bus
            .publish("highway/MI/entry/manual/state", "{}".to_string(), QOS_AT_LEAST_ONCE)
            .await;
        assert_eq!(n, 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let bus = MessageBus::new();
        bus.publish("highway/MI/entry/manual/state", "{}".to_string(), QOS_AT_LEAST_ONCE)
            .await;

        let mut rx = bus.subscribe("highway/#");
        assert!(rx.try_recv().is_err());
    }
}
