//! Per-vehicle crossing state held by a toll-booth orchestrator
//!
//! One entry per pass id, covering the whole crossing from the first entry
//! command to exit completion. The phases are an explicit tagged union
//! rather than presence/absence across several maps, so an illegal
//! transition is a visible non-match instead of an emergent property.
//!
//! The registry is shared by concurrent handler invocations; writes are
//! last-writer-wins per pass id. There is no capacity bound and no eviction:
//! a vehicle that enters and never exits stays open indefinitely, which
//! matches the deployed behavior and is flagged as an open hardening
//! question rather than silently papered over here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::topics::Channel;

/// A vehicle's in-progress crossing, from entry acceptance to exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub pass_id: String,
    pub channel: Channel,
    pub entry_tollbooth_id: String,
    pub plate: String,
    pub entry_at: DateTime<Utc>,
}

/// Crossing phase for one pass id; absence from the registry is "no session"
#[derive(Debug, Clone, PartialEq)]
pub enum CrossingState {
    /// Entry command accepted, camera lookup outstanding
    EntryPending { channel: Channel },
    /// Vehicle is on the highway
    Open(Session),
    /// Exit command accepted, toll-price lookup outstanding
    AwaitingPrice(Session),
    /// Price known, manual lane waiting for cash
    AwaitingPayment { session: Session, amount_cents: i64 },
}

impl CrossingState {
    /// The session record, for every phase that has one
    pub fn session(&self) -> Option<&Session> {
        match self {
            CrossingState::EntryPending { .. } => None,
            CrossingState::Open(s) => Some(s),
            CrossingState::AwaitingPrice(s) => Some(s),
            CrossingState::AwaitingPayment { session, .. } => Some(session),
        }
    }
}

/// Thread-safe crossing registry, keyed by pass id
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, CrossingState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace the state for a pass id (last writer wins)
    pub fn put(&self, pass_id: &str, state: CrossingState) {
        self.inner.write().insert(pass_id.to_string(), state);
    }

    pub fn get(&self, pass_id: &str) -> Option<CrossingState> {
        self.inner.read().get(pass_id).cloned()
    }

    /// Remove and return the state for a pass id
    pub fn remove(&self, pass_id: &str) -> Option<CrossingState> {
        self.inner.write().remove(pass_id)
    }

    /// Remove the entry only if it is still an outstanding entry lookup.
    ///
    /// Used by the camera watchdog: by the time it fires, the response may
    /// already have opened the session, which must not be torn down.
    pub fn remove_if_entry_pending(&self, pass_id: &str) -> bool {
        let mut map = self.inner.write();
        if matches!(map.get(pass_id), Some(CrossingState::EntryPending { .. })) {
            map.remove(pass_id);
            true
        } else {
            false
        }
    }

    /// Roll an outstanding price lookup back to an open session.
    ///
    /// Used by the price watchdog; a no-op in any other phase.
    pub fn reopen_if_awaiting_price(&self, pass_id: &str) -> bool {
        let mut map = self.inner.write();
        match map.get(pass_id) {
            Some(CrossingState::AwaitingPrice(session)) => {
                let session = session.clone();
                map.insert(pass_id.to_string(), CrossingState::Open(session));
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
