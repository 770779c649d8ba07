//! Plate-lookup client
//!
//! Fires a `CAMERA_REQUEST` at the plate-recognition service and tracks the
//! correlation id until the response comes back as an independent message.
//! The round trip is never awaited: the entry on the tracker is the only
//! thing connecting the two halves.

use tollgrid_core::messages::outbound;
use tollgrid_core::topics::{camera_requests_topic, Channel, Direction};
use tollgrid_core::{new_correlation_id, CorrelationTracker, MessageBus, QOS_AT_LEAST_ONCE};
use tracing::debug;

/// Camera request/response client for one tollbooth
#[derive(Clone)]
pub struct CameraLookup {
    bus: MessageBus,
    tollbooth_id: String,
    pending: CorrelationTracker,
}

impl CameraLookup {
    pub fn new(bus: MessageBus, tollbooth_id: impl Into<String>) -> Self {
        Self {
            bus,
            tollbooth_id: tollbooth_id.into(),
            pending: CorrelationTracker::new(),
        }
    }

    /// Publish a plate request bound to a fresh correlation id.
    ///
    /// The id is tracked before the publish so a fast responder cannot race
    /// the bookkeeping. Returns the correlation id for watchdog duty.
    pub async fn request_plate(
        &self,
        direction: Direction,
        channel: Channel,
        pass_id: &str,
    ) -> String {
        let correlation_id = new_correlation_id();
        self.pending.track(&correlation_id, pass_id);

        let body = outbound::camera_request(&correlation_id, direction, channel, pass_id);
        let topic = camera_requests_topic(&self.tollbooth_id, direction);
        self.bus.publish(&topic, body.to_string(), QOS_AT_LEAST_ONCE).await;

        debug!(
            "Camera request for {} on {} (correlation {})",
            pass_id, topic, correlation_id
        );
        correlation_id
    }

    /// Consume the pass id tracked for a correlation id, if any
    pub fn consume(&self, correlation_id: &str) -> Option<String> {
        self.pending.resolve(correlation_id)
    }

    /// Evict a round trip that never completed
    pub fn discard(&self, correlation_id: &str) -> bool {
        self.pending.discard(correlation_id)
    }

    /// Outstanding camera round trips
    pub fn outstanding(&self) -> usize {
        self.pending.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tollgrid_core::topics::filters;

    #[tokio::test]
    async fn test_request_publishes_and_tracks() {
        let bus = MessageBus::new();
        let mut requests = bus.subscribe(filters::CAMERA_REQUESTS);
        let camera = CameraLookup::new(bus.clone(), "MI");

        let correlation_id = camera
            .request_plate(Direction::Entry, Channel::Telepass, "TP-1")
            .await;

        let delivery = requests.recv().await.unwrap();
        assert_eq!(delivery.topic, "highway/MI/entry/camera/requests");

        let body: Value = serde_json::from_str(&delivery.payload).unwrap();
        assert_eq!(body["type"], "CAMERA_REQUEST");
        assert_eq!(body["correlationId"], correlation_id.as_str());
        assert_eq!(body["channel"], "telepass");
        assert_eq!(body["passId"], "TP-1");

        assert_eq!(camera.consume(&correlation_id), Some("TP-1".to_string()));
        assert_eq!(camera.consume(&correlation_id), None);
    }
}
