//! Plate-recognition responder
//!
//! Stateless simulator of the roadside camera service. Each valid request
//! produces one response — a randomized plate and confidence score — on the
//! requester's `responses` topic, echoing the correlation id. No two
//! requests share any state.

use rand::Rng;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tollgrid_core::messages::{outbound, CameraRequest};
use tollgrid_core::topics::{filters, responses_topic, Channel, Leaf, TopicAddress};
use tollgrid_core::{MessageBus, QOS_AT_LEAST_ONCE};

/// Stateless plate-recognition service
#[derive(Clone)]
pub struct PlateRecognizer {
    bus: MessageBus,
}

impl PlateRecognizer {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }

    /// Handle one `camera/requests` message
    pub async fn on_request(&self, topic: &str, payload: &str) {
        let addr = match TopicAddress::parse(topic) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Dropping unaddressable camera request: {}", e);
                return;
            }
        };
        let TopicAddress::Booth {
            tollbooth_id,
            direction,
            channel,
            leaf,
        } = addr
        else {
            return;
        };

        if channel != Channel::Camera || leaf != Leaf::Requests {
            return;
        }

        let body: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                debug!("Dropping unparsable camera request: {}", e);
                return;
            }
        };

        let Some(request) = CameraRequest::decode(&body) else {
            debug!("Dropping invalid camera request on {}", topic);
            return;
        };

        let plate = random_plate();
        let confidence = random_confidence();
        let response = outbound::camera_response(
            &request.correlation_id,
            &plate,
            confidence,
            direction,
            request.pass_id.as_deref(),
        );

        let response_topic = responses_topic(&tollbooth_id, direction, request.channel);
        self.bus
            .publish(&response_topic, response.to_string(), QOS_AT_LEAST_ONCE)
            .await;

        debug!(
            "Recognized plate {} ({:.2}) for correlation {}",
            plate, confidence, request.correlation_id
        );
    }

    /// Subscribe to every booth's camera requests and serve them
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe(filters::CAMERA_REQUESTS);
        info!("PlateRecognizer started");
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                self.on_request(&delivery.topic, &delivery.payload).await;
            }
        })
    }
}

/// Synthetic plate: two letters, a 3-digit number, two letters
fn random_plate() -> String {
    let mut rng = rand::thread_rng();
    let a = rng.gen_range(b'A'..=b'Z') as char;
    let b = rng.gen_range(b'A'..=b'Z') as char;
    let n: u32 = rng.gen_range(100..1000);
    let c = rng.gen_range(b'A'..=b'Z') as char;
    let d = rng.gen_range(b'A'..=b'Z') as char;
    format!("{}{}{}{}{}", a, b, n, c, d)
}

/// Confidence uniformly distributed in [0.90, 0.99)
fn random_confidence() -> f64 {
    0.90 + rand::thread_rng().gen::<f64>() * 0.09
}
