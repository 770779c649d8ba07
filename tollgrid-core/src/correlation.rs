//! Correlation-id tracking for asynchronous request/response round trips
//!
//! A request is fire-and-published; the response arrives later as an
//! independent message. The tracker maps the request's correlation id back
//! to the pass id that originated it. Entries are single-use: the first
//! matching response consumes the entry, a second response (duplicate
//! delivery, or a foreign id overheard on a wildcard subscription) resolves
//! to nothing and is dropped by the caller. In-flight entries do not survive
//! a restart; the original command must be re-issued.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

/// Mint a fresh correlation id
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Single-use correlation id -> pass id map
#[derive(Clone)]
pub struct CorrelationTracker {
    pending: Arc<RwLock<HashMap<String, String>>>,
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record an outstanding request
    pub fn track(&self, correlation_id: &str, pass_id: &str) {
        self.pending
            .write()
            .insert(correlation_id.to_string(), pass_id.to_string());
    }

    /// Consume the entry for a correlation id.
    ///
    /// Returns the originating pass id on the first call, `None` afterwards
    /// and for ids this tracker never issued.
    pub fn resolve(&self, correlation_id: &str) -> Option<String> {
        self.pending.write().remove(correlation_id)
    }

    /// Drop an entry without resolving it (timeout eviction).
    ///
    /// Returns whether the entry was still outstanding.
    pub fn discard(&self, correlation_id: &str) -> bool {
        self.pending.write().remove(correlation_id).is_some()
    }

    /// Number of outstanding round trips
    pub fn outstanding(&self) -> usize {
        self.pending.read().len()
    }
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new()
    }
}
