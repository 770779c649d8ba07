//! Toll-booth orchestrator
//!
//! Drives a vehicle's entry and exit sagas for one tollbooth. Every inbound
//! message is handled on its own invocation and never waits for a round
//! trip: camera and toll-price requests are fire-and-published, and the
//! responses arrive later through their correlation ids.
//!
//! Anything that does not concern this booth — foreign tollbooth ids,
//! unknown types, missing fields, stale correlations — is dropped with a
//! diagnostic. The bus has no negative-acknowledgement channel, so a
//! rejected exit surfaces as an `EXIT_REJECTED` state event, never as an
//! error to a caller.

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tollgrid_core::messages::{outbound, Command, CameraResponse, TollPriceResponse, TICKET_PREFIX};
use tollgrid_core::topics::{
    events_topic, filters, responses_topic, state_topic, Channel, Direction, Leaf, TopicAddress,
    TOLLPRICE_REQUESTS,
};
use tollgrid_core::{
    new_correlation_id, CorrelationTracker, CrossingState, MessageBus, Session, SessionRegistry,
    QOS_AT_LEAST_ONCE,
};

use crate::camera::CameraLookup;
use crate::config::BoothConfig;

const REASON_NO_ACTIVE_SESSION: &str = "NO_ACTIVE_SESSION";

/// Orchestrator for one tollbooth
#[derive(Clone)]
pub struct TollBooth {
    bus: MessageBus,
    camera: CameraLookup,
    sessions: SessionRegistry,
    pending_price: CorrelationTracker,
    config: BoothConfig,
}

impl TollBooth {
    /// Create an orchestrator over an injected session registry.
    ///
    /// The registry is shared with the caller so tests (and diagnostics)
    /// can observe crossing state directly.
    pub fn new(bus: MessageBus, sessions: SessionRegistry, config: BoothConfig) -> Self {
        let camera = CameraLookup::new(bus.clone(), &config.tollbooth_id);
        Self {
            bus,
            camera,
            sessions,
            pending_price: CorrelationTracker::new(),
            config,
        }
    }

    pub fn tollbooth_id(&self) -> &str {
        &self.config.tollbooth_id
    }

    /// Reply topic handed to the pricing service for a given lane channel
    pub fn toll_price_reply_topic(&self, channel: Channel) -> String {
        responses_topic(&self.config.tollbooth_id, Direction::Exit, channel)
    }

    /// Handle a UI command arriving on a `commands` topic
    pub async fn on_command(&self, topic: &str, payload: &str) {
        let addr = match TopicAddress::parse(topic) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Dropping unaddressable message: {}", e);
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

        if leaf != Leaf::Commands || tollbooth_id != self.config.tollbooth_id {
            return;
        }

        let Some(body) = parse_body(payload) else { return };
        let Some(command) = Command::decode(direction, channel, &body) else {
            debug!("Dropping non-command body on {}", topic);
            return;
        };

        match command {
            Command::EnterManual => {
                self.handle_entry(channel, new_ticket_id()).await;
            }
            Command::EnterTelepass { telepass_id } => {
                self.handle_entry(channel, telepass_id).await;
            }
            Command::RequestExit { pass_id } => {
                self.handle_exit(channel, pass_id).await;
            }
            Command::InsertPayment { pass_id, amount_cents } => {
                self.handle_insert_payment(pass_id, amount_cents).await;
            }
        }
    }

    /// Entry flow: mark the crossing pending and ask the camera for a plate
    async fn handle_entry(&self, channel: Channel, pass_id: String) {
        self.sessions
            .put(&pass_id, CrossingState::EntryPending { channel });

        let correlation_id = self
            .camera
            .request_plate(Direction::Entry, channel, &pass_id)
            .await;
        self.spawn_camera_watchdog(correlation_id, pass_id.clone());

        // optimistic: published before the camera answers
        self.publish_state(Direction::Entry, channel, outbound::entry_pending(&pass_id))
            .await;
    }

    /// Exit flow: ask the pricing service for the fare of this crossing
    async fn handle_exit(&self, channel: Channel, pass_id: String) {
        let session = match self.sessions.get(&pass_id) {
            Some(CrossingState::Open(s)) | Some(CrossingState::AwaitingPrice(s)) => s,
            Some(CrossingState::AwaitingPayment { session, .. }) => session,
            _ => {
                info!("Exit rejected for {}: no active session", pass_id);
                self.publish_state(
                    Direction::Exit,
                    channel,
                    outbound::exit_rejected(&pass_id, REASON_NO_ACTIVE_SESSION),
                )
                .await;
                return;
            }
        };

        let correlation_id = new_correlation_id();
        self.pending_price.track(&correlation_id, &pass_id);

        let body = outbound::tollprice_request(
            &correlation_id,
            &self.toll_price_reply_topic(channel),
            &session.entry_tollbooth_id,
            &self.config.tollbooth_id,
            channel,
            &pass_id,
        );
        self.bus
            .publish(TOLLPRICE_REQUESTS, body.to_string(), QOS_AT_LEAST_ONCE)
            .await;

        self.sessions.put(&pass_id, CrossingState::AwaitingPrice(session));
        self.spawn_price_watchdog(correlation_id, pass_id.clone());

        self.publish_state(Direction::Exit, channel, outbound::exit_pending_price(&pass_id))
            .await;
    }

    /// Cash arriving at a manual lane; legal only while payment is awaited
    async fn handle_insert_payment(&self, pass_id: String, amount_cents: i64) {
        let session = match self.sessions.get(&pass_id) {
            Some(CrossingState::AwaitingPayment { session, .. }) => session,
            other => {
                debug!(
                    "Dropping INSERT_PAYMENT for {}: not awaiting payment ({:?})",
                    pass_id, other
                );
                return;
            }
        };

        let topic = events_topic(&self.config.tollbooth_id, Direction::Exit, Channel::Manual);
        let event = outbound::exit_completed(
            Channel::Manual,
            &session.entry_tollbooth_id,
            amount_cents,
            &session.pass_id,
        );
        self.bus.publish(&topic, event.to_string(), QOS_AT_LEAST_ONCE).await;

        self.sessions.remove(&pass_id);
        info!("Exit completed (manual, paid) for {}", pass_id);

        self.publish_state(
            Direction::Exit,
            Channel::Manual,
            outbound::payment_accepted(&pass_id, amount_cents),
        )
        .await;
    }

    /// Handle a plate-recognition response on an entry `responses` topic
    pub async fn on_camera_response(&self, topic: &str, payload: &str) {
        let addr = match TopicAddress::parse(topic) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Dropping unaddressable message: {}", e);
                return;
            }
        };
        let TopicAddress::Booth {
            tollbooth_id,
            direction,
            channel: addr_channel,
            leaf,
        } = addr
        else {
            return;
        };

        if leaf != Leaf::Responses
            || direction != Direction::Entry
            || tollbooth_id != self.config.tollbooth_id
        {
            return;
        }

        let Some(body) = parse_body(payload) else { return };
        let Some(response) = CameraResponse::decode(&body) else { return };

        // the correlation entry is consumed even if the plate turns out bad
        let pass_id = response
            .correlation_id
            .as_deref()
            .and_then(|id| self.camera.consume(id))
            .or(response.pass_id); // fallback for legacy producers
        let Some(pass_id) = pass_id else { return };

        let Some(plate) = response.plate.filter(|p| !p.trim().is_empty()) else {
            debug!("Dropping camera response for {}: no plate", pass_id);
            return;
        };

        let channel = match addr_channel {
            Channel::Manual | Channel::Telepass => addr_channel,
            Channel::Camera => {
                if pass_id.starts_with(TICKET_PREFIX) {
                    Channel::Manual
                } else {
                    Channel::Telepass
                }
            }
        };

        let session = Session {
            pass_id: pass_id.clone(),
            channel,
            entry_tollbooth_id: self.config.tollbooth_id.clone(),
            plate: plate.clone(),
            entry_at: chrono::Utc::now(),
        };
        self.sessions.put(&pass_id, CrossingState::Open(session));
        info!("Entry accepted for {} (plate {})", pass_id, plate);

        let topic = events_topic(&self.config.tollbooth_id, Direction::Entry, channel);
        let event = outbound::entry_accepted(channel, &plate, &pass_id);
        self.bus.publish(&topic, event.to_string(), QOS_AT_LEAST_ONCE).await;

        self.publish_state(
            Direction::Entry,
            channel,
            outbound::entry_accepted_ui(&pass_id, &plate),
        )
        .await;
    }

    /// Handle a toll-price response arriving on one of our reply topics
    pub async fn on_toll_price_response(&self, payload: &str) {
        let Some(body) = parse_body(payload) else { return };
        let Some(response) = TollPriceResponse::decode(&body) else { return };

        let Some(pass_id) = self.pending_price.resolve(&response.correlation_id) else {
            // consumed, timed out, or somebody else's round trip
            return;
        };

        let session = match self.sessions.get(&pass_id) {
            Some(CrossingState::AwaitingPrice(s)) | Some(CrossingState::Open(s)) => s,
            other => {
                debug!(
                    "Dropping toll-price response for {}: unexpected state {:?}",
                    pass_id, other
                );
                return;
            }
        };

        if session.channel == Channel::Telepass {
            // payment is deferred to a debt on the ledger side
            let topic = events_topic(&self.config.tollbooth_id, Direction::Exit, Channel::Telepass);
            let event = outbound::exit_completed(
                Channel::Telepass,
                &session.entry_tollbooth_id,
                response.amount_cents,
                &session.pass_id,
            );
            self.bus.publish(&topic, event.to_string(), QOS_AT_LEAST_ONCE).await;

            self.sessions.remove(&pass_id);
            info!(
                "Exit completed (telepass, deferred) for {}: {} cents",
                pass_id, response.amount_cents
            );
            return;
        }

        self.sessions.put(
            &pass_id,
            CrossingState::AwaitingPayment {
                session,
                amount_cents: response.amount_cents,
            },
        );
        self.publish_state(
            Direction::Exit,
            Channel::Manual,
            outbound::request_payment(&pass_id, response.amount_cents),
        )
        .await;
    }

    /// Evict a camera round trip that never resolved.
    ///
    /// The deployed system keeps dangling correlations forever; the bounded
    /// timeout here only ever fires when the happy path already lost.
    fn spawn_camera_watchdog(&self, correlation_id: String, pass_id: String) {
        let camera = self.camera.clone();
        let sessions = self.sessions.clone();
        let timeout = self.config.response_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if camera.discard(&correlation_id) {
                warn!(
                    "Camera response timeout for {} (correlation {})",
                    pass_id, correlation_id
                );
                sessions.remove_if_entry_pending(&pass_id);
            }
        });
    }

    /// Evict a toll-price round trip that never resolved
    fn spawn_price_watchdog(&self, correlation_id: String, pass_id: String) {
        let pending_price = self.pending_price.clone();
        let sessions = self.sessions.clone();
        let timeout = self.config.response_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if pending_price.discard(&correlation_id) {
                warn!(
                    "Toll-price response timeout for {} (correlation {})",
                    pass_id, correlation_id
                );
                sessions.reopen_if_awaiting_price(&pass_id);
            }
        });
    }

    async fn publish_state(&self, direction: Direction, channel: Channel, body: Value) {
        let topic = state_topic(&self.config.tollbooth_id, direction, channel);
        self.bus.publish(&topic, body.to_string(), QOS_AT_LEAST_ONCE).await;
    }

    /// Wire this orchestrator's subscriptions onto handler tasks.
    ///
    /// Commands come in over wildcards (one subscription covers every
    /// booth; the handler filters by id); camera and price responses over
    /// the exact reply topics this booth hands out.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for filter in [filters::ENTRY_COMMANDS, filters::EXIT_COMMANDS] {
            let mut rx = self.bus.subscribe(filter);
            let booth = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    booth.on_command(&delivery.topic, &delivery.payload).await;
                }
            }));
        }

        for channel in [Channel::Manual, Channel::Telepass] {
            let mut rx = self.bus.subscribe(&self.toll_price_reply_topic(channel));
            let booth = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    booth.on_toll_price_response(&delivery.payload).await;
                }
            }));

            let topic = responses_topic(&self.config.tollbooth_id, Direction::Entry, channel);
            let mut rx = self.bus.subscribe(&topic);
            let booth = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    booth.on_camera_response(&delivery.topic, &delivery.payload).await;
                }
            }));
        }

        info!("TollBooth started: {}", self.config.tollbooth_id);
        handles
    }
}

/// Synthesize a fresh manual ticket id
fn new_ticket_id() -> String {
    format!(
        "{}{}",
        TICKET_PREFIX,
        uuid::Uuid::new_v4().to_string()[..8].to_uppercase()
    )
}

fn parse_body(payload: &str) -> Option<Value> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Dropping unparsable body: {}", e);
            None
        }
    }
}
