//! Fare lookup table
//!
//! A priced (entry, exit) tollbooth pair. Read-only from the protocol's
//! perspective: the pricing responder only ever looks pairs up, and an
//! absent pair resolves to nothing (the responder prices it at zero).
//! Writes come through the administrative surface, which reaches the table
//! via [`FareTable::set_fare`], or from a JSON seed file at node startup.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One priced tollbooth pair, as serialized in a seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fare {
    pub entry_tollbooth_id: String,
    pub exit_tollbooth_id: String,
    pub amount_cents: i64,
}

/// Thread-safe fare table, keyed by (entry, exit)
#[derive(Clone)]
pub struct FareTable {
    inner: Arc<RwLock<HashMap<(String, String), i64>>>,
}

impl FareTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Price a tollbooth pair (the administrative write contract)
    pub fn set_fare(&self, entry_tollbooth_id: &str, exit_tollbooth_id: &str, amount_cents: i64) {
        self.inner.write().insert(
            (entry_tollbooth_id.to_string(), exit_tollbooth_id.to_string()),
            amount_cents,
        );
    }

    /// Look up the fare for a pair; absent pairs are `None`, not an error
    pub fn fare_cents(&self, entry_tollbooth_id: &str, exit_tollbooth_id: &str) -> Option<i64> {
        self.inner
            .read()
            .get(&(entry_tollbooth_id.to_string(), exit_tollbooth_id.to_string()))
            .copied()
    }

    /// Load fares from a JSON array of [`Fare`] records, returning the count
    pub fn load_json(&self, path: impl AsRef<Path>) -> io::Result<usize> {
        let data = fs::read_to_string(path.as_ref())?;
        let fares: Vec<Fare> = serde_json::from_str(&data)?;

        let count = fares.len();
        let mut table = self.inner.write();
        for fare in fares {
            table.insert(
                (fare.entry_tollbooth_id, fare.exit_tollbooth_id),
                fare.amount_cents,
            );
        }

        info!("Loaded {} fare(s) from {:?}", count, path.as_ref());
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for FareTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_directional() {
        let fares = FareTable::new();
        fares.set_fare("MI", "TO", 850);

        assert_eq!(fares.fare_cents("MI", "TO"), Some(850));
        assert_eq!(fares.fare_cents("TO", "MI"), None);
        assert_eq!(fares.fare_cents("MI", "BO"), None);
    }

    #[test]
    fn test_set_fare_overwrites() {
        let fares = FareTable::new();
        fares.set_fare("MI", "TO", 850);
        fares.set_fare("MI", "TO", 900);

        assert_eq!(fares.fare_cents("MI", "TO"), Some(900));
        assert_eq!(fares.len(), 1);
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fares.json");
        std::fs::write(
            &path,
            r#"[
                {"entryTollboothId": "MI", "exitTollboothId": "TO", "amountCents": 850},
                {"entryTollboothId": "TO", "exitTollboothId": "BO", "amountCents": 620}
            ]"#,
        )
        .unwrap();

        let fares = FareTable::new();
        assert_eq!(fares.load_json(&path).unwrap(), 2);
        assert_eq!(fares.fare_cents("MI", "TO"), Some(850));
        assert_eq!(fares.fare_cents("TO", "BO"), Some(620));
    }
}
