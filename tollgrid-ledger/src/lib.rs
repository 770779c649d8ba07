//! # Tollgrid Ledger
//!
//! Pricing responder and trip/debt ledger for the tollgrid highway toll
//! network.
//!
//! Consumes `ENTRY_ACCEPTED`/`EXIT_COMPLETED` events from every tollbooth
//! to keep the persisted trip records, spawns an `OPEN` debt for each
//! deferred telepass exit, and answers `TOLLPRICE_REQUEST` messages on the
//! caller's reply topic from the fare table. The payment operations
//! (settling debts, listing them, the open/collected summary) are the
//! persistence contract the administrative HTTP surface builds on.

pub mod fares;
pub mod service;
pub mod store;

pub use fares::{Fare, FareTable};
pub use service::{LedgerService, PaymentError, PaymentSummary};
pub use store::{Debt, DebtStatus, LedgerStore, Trip, CURRENCY};
