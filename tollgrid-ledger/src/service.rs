//! Pricing and ledger responder
//!
//! Subscribes to every tollbooth's `events` leaf and to the global
//! `highway/requests/tollprice` address. Domain events mutate the persisted
//! trip/debt records; price requests are answered on the caller's reply
//! topic. A message the ledger cannot act on is dropped with a logged
//! diagnostic — there is no retry queue and no dead-letter topic, so a
//! failed persistence write simply loses that message.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tollgrid_core::messages::{outbound, TollEvent, TollPriceRequest};
use tollgrid_core::topics::{filters, Channel, Leaf, TopicAddress, TOLLPRICE_REQUESTS};
use tollgrid_core::{MessageBus, QOS_AT_LEAST_ONCE};

use crate::fares::FareTable;
use crate::store::{Debt, LedgerStore, CURRENCY};

/// Errors from the payment contract (the surface behind the admin API)
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("debt not found or already paid")]
    NotPayable,

    #[error("debt not found after payment")]
    Inconsistent,

    #[error("ledger storage failure: {0}")]
    Storage(#[from] std::io::Error),
}

/// Aggregate payment position across the whole ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub currency: String,
    pub open_debt_cents: i64,
    pub collected_cents: i64,
}

/// The pricing responder and its ledger
#[derive(Clone)]
pub struct LedgerService {
    bus: MessageBus,
    store: Arc<LedgerStore>,
    fares: FareTable,
}

impl LedgerService {
    pub fn new(bus: MessageBus, store: Arc<LedgerStore>, fares: FareTable) -> Self {
        Self { bus, store, fares }
    }

    /// Dispatch one inbound message by its address
    pub async fn handle(&self, topic: &str, payload: &str) {
        let addr = match TopicAddress::parse(topic) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("Dropping unaddressable message: {}", e);
                return;
            }
        };

        let body: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                debug!("Dropping unparsable body on {}: {}", topic, e);
                return;
            }
        };

        match addr {
            TopicAddress::Global { leaf } if leaf == "tollprice" => {
                self.on_tollprice_request(&body).await;
            }
            TopicAddress::Global { .. } => {}
            TopicAddress::Booth {
                tollbooth_id,
                channel,
                leaf: Leaf::Events,
                ..
            } => match TollEvent::decode(&body) {
                Some(event) => self.on_event(&tollbooth_id, channel, event),
                None => debug!("Unknown event type on {}", topic),
            },
            TopicAddress::Booth { .. } => {}
        }
    }

    fn on_event(&self, tollbooth_id: &str, channel: Channel, event: TollEvent) {
        match event {
            TollEvent::EntryAccepted {
                plate,
                ticket_id,
                telepass_id,
                timestamp,
            } => {
                let result = match channel {
                    Channel::Manual => {
                        let (Some(plate), Some(ticket_id)) = (plate, ticket_id) else {
                            warn!("Invalid ENTRY_ACCEPTED manual: missing plate/ticketId");
                            return;
                        };
                        self.store
                            .create_trip_manual(tollbooth_id, &plate, &ticket_id, timestamp)
                    }
                    Channel::Telepass => {
                        let (Some(plate), Some(telepass_id)) = (plate, telepass_id) else {
                            warn!("Invalid ENTRY_ACCEPTED telepass: missing plate/telepassId");
                            return;
                        };
                        self.store
                            .create_trip_telepass(tollbooth_id, &plate, &telepass_id, timestamp)
                    }
                    Channel::Camera => {
                        warn!("ENTRY_ACCEPTED ignored: channel={}", channel);
                        return;
                    }
                };

                match result {
                    Ok(trip_id) => info!("Trip {} opened at {}", trip_id, tollbooth_id),
                    Err(e) => error!("Trip create failed, event lost: {}", e),
                }
            }

            TollEvent::ExitCompleted {
                entry_tollbooth_id,
                amount_cents,
                ticket_id,
                telepass_id,
                timestamp,
            } => {
                let (Some(_entry), Some(amount_cents)) = (entry_tollbooth_id, amount_cents) else {
                    warn!("Invalid EXIT_COMPLETED: missing entryTollboothId/amountCents");
                    return;
                };

                match channel {
                    Channel::Manual => {
                        let Some(ticket_id) = ticket_id else {
                            warn!("Invalid EXIT_COMPLETED manual: missing ticketId");
                            return;
                        };
                        let Some(trip_id) = self.store.find_active_trip_by_ticket(&ticket_id)
                        else {
                            warn!("No active trip for ticketId={}", ticket_id);
                            return;
                        };
                        if let Err(e) =
                            self.store
                                .close_trip(trip_id, tollbooth_id, timestamp, amount_cents, true)
                        {
                            error!("Trip close failed, event lost: {}", e);
                            return;
                        }
                        info!("Trip {} closed at {} (paid)", trip_id, tollbooth_id);
                    }
                    Channel::Telepass => {
                        let Some(telepass_id) = telepass_id else {
                            warn!("Invalid EXIT_COMPLETED telepass: missing telepassId");
                            return;
                        };
                        let Some(trip_id) = self.store.find_active_trip_by_telepass(&telepass_id)
                        else {
                            warn!("No active trip for telepassId={}", telepass_id);
                            return;
                        };
                        // two independent writes; a crash in between leaves
                        // a closed trip with no debt
                        if let Err(e) =
                            self.store
                                .close_trip(trip_id, tollbooth_id, timestamp, amount_cents, false)
                        {
                            error!("Trip close failed, event lost: {}", e);
                            return;
                        }
                        match self
                            .store
                            .create_debt(&telepass_id, trip_id, amount_cents, timestamp)
                        {
                            Ok(debt_id) => info!(
                                "Trip {} closed at {} (debt {} open)",
                                trip_id, tollbooth_id, debt_id
                            ),
                            Err(e) => error!("Debt create failed after trip close: {}", e),
                        }
                    }
                    Channel::Camera => {
                        warn!("EXIT_COMPLETED ignored: channel={}", channel);
                    }
                }
            }
        }
    }

    /// Price a crossing and answer on the caller's reply topic
    async fn on_tollprice_request(&self, body: &Value) {
        let Some(request) = TollPriceRequest::decode(body) else {
            warn!("Invalid TOLLPRICE_REQUEST: missing correlationId/replyTopic");
            return;
        };

        // an unknown pair is priced at zero, not treated as an error
        let amount_cents = match (&request.entry_tollbooth_id, &request.exit_tollbooth_id) {
            (Some(entry), Some(exit)) => self.fares.fare_cents(entry, exit).unwrap_or(0),
            _ => 0,
        };

        let response = outbound::tollprice_response(&request.correlation_id, amount_cents, CURRENCY);
        self.bus
            .publish(&request.reply_topic, response.to_string(), QOS_AT_LEAST_ONCE)
            .await;

        debug!(
            "Priced {}->{} at {} cents (correlation {})",
            request.entry_tollbooth_id.as_deref().unwrap_or("?"),
            request.exit_tollbooth_id.as_deref().unwrap_or("?"),
            amount_cents,
            request.correlation_id
        );
    }

    /// Settle a telepass debt: OPEN -> PAID once, then mark the trip paid
    pub fn pay_debt(&self, debt_id: u64) -> Result<Debt, PaymentError> {
        let trip_id = self
            .store
            .mark_debt_paid(debt_id)?
            .ok_or(PaymentError::NotPayable)?;
        self.store.mark_trip_paid(trip_id)?;

        self.store.find_debt(debt_id).ok_or(PaymentError::Inconsistent)
    }

    /// Debts of one telepass account, newest first
    pub fn debts_by_telepass(&self, telepass_id: &str) -> Vec<Debt> {
        self.store.debts_by_telepass(telepass_id)
    }

    /// Aggregate position: open debt vs. collected amounts
    pub fn summary(&self) -> PaymentSummary {
        PaymentSummary {
            currency: CURRENCY.to_string(),
            open_debt_cents: self.store.sum_open_debt_cents(),
            collected_cents: self.store.sum_collected_cents(),
        }
    }

    /// Subscribe to the event leaves and the global price address
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for filter in [filters::ENTRY_EVENTS, filters::EXIT_EVENTS, TOLLPRICE_REQUESTS] {
            let mut rx = self.bus.subscribe(filter);
            let service = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    service.handle(&delivery.topic, &delivery.payload).await;
                }
            }));
        }

        info!("LedgerService started");
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(bus: &MessageBus) -> LedgerService {
        let fares = FareTable::new();
        fares.set_fare("MI", "TO", 850);
        LedgerService::new(bus.clone(), Arc::new(LedgerStore::in_memory()), fares)
    }

    #[tokio::test]
    async fn test_manual_trip_roundtrip() {
        let bus = MessageBus::new();
        let ledger = service(&bus);

        ledger
            .handle(
                "highway/MI/entry/manual/events",
                &json!({
                    "type": "ENTRY_ACCEPTED",
                    "plate": "AB123CD",
                    "ticketId": "TCK-1",
                    "timestamp": "2026-08-07T10:00:00Z"
                })
                .to_string(),
            )
            .await;

        let trip_id = ledger.store.find_active_trip_by_ticket("TCK-1").unwrap();

        ledger
            .handle(
                "highway/TO/exit/manual/events",
                &json!({
                    "type": "EXIT_COMPLETED",
                    "entryTollboothId": "MI",
                    "amountCents": 850,
                    "ticketId": "TCK-1",
                    "timestamp": "2026-08-07T11:00:00Z"
                })
                .to_string(),
            )
            .await;

        let trip = ledger.store.trip(trip_id).unwrap();
        assert!(!trip.is_active());
        assert_eq!(trip.exit_tollbooth_id.as_deref(), Some("TO"));
        assert!(trip.paid);
        assert_eq!(ledger.summary().collected_cents, 850);
        assert_eq!(ledger.summary().open_debt_cents, 0);
    }

    #[tokio::test]
    async fn test_telepass_exit_spawns_matching_debt() {
        let bus = MessageBus::new();
        let ledger = service(&bus);

        ledger
            .handle(
                "highway/MI/entry/telepass/events",
                &json!({
                    "type": "ENTRY_ACCEPTED",
                    "plate": "AB123CD",
                    "telepassId": "TP-1"
                })
                .to_string(),
            )
            .await;

        ledger
            .handle(
                "highway/TO/exit/telepass/events",
                &json!({
                    "type": "EXIT_COMPLETED",
                    "entryTollboothId": "MI",
                    "amountCents": 850,
                    "telepassId": "TP-1"
                })
                .to_string(),
            )
            .await;

        // exactly one OPEN debt, same amount and trip id as the closed trip
        let debts = ledger.debts_by_telepass("TP-1");
        assert_eq!(debts.len(), 1);
        let debt = &debts[0];
        assert_eq!(debt.amount_cents, 850);

        let trip = ledger.store.trip(debt.trip_id).unwrap();
        assert!(!trip.paid);
        assert_eq!(trip.amount_cents, Some(850));

        let summary = ledger.summary();
        assert_eq!(summary.open_debt_cents, 850);
        assert_eq!(summary.collected_cents, 0);
    }

    #[tokio::test]
    async fn test_pay_debt_flips_both_records_once() {
        let bus = MessageBus::new();
        let ledger = service(&bus);

        let trip_id = ledger
            .store
            .create_trip_telepass("MI", "AB123CD", "TP-1", chrono::Utc::now())
            .unwrap();
        ledger
            .store
            .close_trip(trip_id, "TO", chrono::Utc::now(), 850, false)
            .unwrap();
        let debt_id = ledger
            .store
            .create_debt("TP-1", trip_id, 850, chrono::Utc::now())
            .unwrap();

        let paid = ledger.pay_debt(debt_id).unwrap();
        assert_eq!(paid.status, crate::store::DebtStatus::Paid);
        assert!(ledger.store.trip(trip_id).unwrap().paid);

        let summary = ledger.summary();
        assert_eq!(summary.open_debt_cents, 0);
        assert_eq!(summary.collected_cents, 850);

        assert!(matches!(
            ledger.pay_debt(debt_id),
            Err(PaymentError::NotPayable)
        ));
    }

    #[tokio::test]
    async fn test_exit_without_active_trip_is_dropped() {
        let bus = MessageBus::new();
        let ledger = service(&bus);

        ledger
            .handle(
                "highway/TO/exit/manual/events",
                &json!({
                    "type": "EXIT_COMPLETED",
                    "entryTollboothId": "MI",
                    "amountCents": 850,
                    "ticketId": "TCK-GHOST"
                })
                .to_string(),
            )
            .await;

        assert_eq!(ledger.store.trip_count(), 0);
        assert_eq!(ledger.store.debt_count(), 0);
    }

    #[tokio::test]
    async fn test_entry_without_plate_creates_nothing() {
        let bus = MessageBus::new();
        let ledger = service(&bus);

        ledger
            .handle(
                "highway/MI/entry/manual/events",
                &json!({"type": "ENTRY_ACCEPTED", "ticketId": "TCK-1"}).to_string(),
            )
            .await;

        assert_eq!(ledger.store.trip_count(), 0);
    }

    #[tokio::test]
    async fn test_price_request_answered_on_reply_topic() {
        let bus = MessageBus::new();
        let mut replies = bus.subscribe("highway/TO/exit/telepass/responses");
        let ledger = service(&bus);

        ledger
            .handle(
                TOLLPRICE_REQUESTS,
                &json!({
                    "type": "TOLLPRICE_REQUEST",
                    "correlationId": "c1",
                    "replyTopic": "highway/TO/exit/telepass/responses",
                    "entryTollboothId": "MI",
                    "exitTollboothId": "TO",
                    "telepassId": "TP-1"
                })
                .to_string(),
            )
            .await;

        let reply = replies.recv().await.unwrap();
        let body: Value = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(body["type"], "TOLLPRICE_RESPONSE");
        assert_eq!(body["correlationId"], "c1");
        assert_eq!(body["amountCents"], 850);
        assert_eq!(body["currency"], "EUR");
    }

    #[tokio::test]
    async fn test_unknown_fare_is_priced_at_zero() {
        let bus = MessageBus::new();
        let mut replies = bus.subscribe("highway/BO/exit/manual/responses");
        let ledger = service(&bus);

        ledger
            .handle(
                TOLLPRICE_REQUESTS,
                &json!({
                    "type": "TOLLPRICE_REQUEST",
                    "correlationId": "c2",
                    "replyTopic": "highway/BO/exit/manual/responses",
                    "entryTollboothId": "NA",
                    "exitTollboothId": "BO"
                })
                .to_string(),
            )
            .await;

        let reply = replies.recv().await.unwrap();
        let body: Value = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(body["amountCents"], 0);
    }

    #[tokio::test]
    async fn test_price_request_without_reply_topic_is_dropped() {
        let bus = MessageBus::new();
        let mut all = bus.subscribe("highway/#");
        let ledger = service(&bus);

        ledger
            .handle(
                TOLLPRICE_REQUESTS,
                &json!({"type": "TOLLPRICE_REQUEST", "correlationId": "c3"}).to_string(),
            )
            .await;

        assert!(all.try_recv().is_err());
    }
}
