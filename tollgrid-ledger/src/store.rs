//! Persistent trip and debt ledger
//!
//! In-memory tables with an append-only JSONL write-ahead log: every
//! mutation is one tagged line, replayed on open. `in_memory()` skips the
//! log entirely (the test twin). A mutation that fails to reach the log
//! leaves the tables untouched and surfaces the error to the handler.
//!
//! Trip close and debt creation are two independent writes, matching the
//! deployed system: a crash between them leaves a closed unpaid trip with
//! no debt. Known gap, kept visible rather than patched over.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Currency every amount in the ledger is denominated in
pub const CURRENCY: &str = "EUR";

/// WAL file name inside the ledger directory
const WAL_FILE: &str = "ledger.log";

/// One vehicle journey; active while the exit fields are unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: u64,
    pub entry_tollbooth_id: String,
    pub exit_tollbooth_id: Option<String>,
    pub ticket_id: Option<String>,
    pub telepass_id: Option<String>,
    pub plate: String,
    pub entry_at: DateTime<Utc>,
    pub exit_at: Option<DateTime<Utc>>,
    pub amount_cents: Option<i64>,
    pub currency: String,
    pub paid: bool,
}

impl Trip {
    pub fn is_active(&self) -> bool {
        self.exit_at.is_none()
    }
}

/// Deferred charge owed by a telepass account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: u64,
    pub telepass_id: String,
    pub trip_id: u64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: DebtStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebtStatus {
    Open,
    Paid,
}

/// WAL record, one JSON line per mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WalEntry {
    #[serde(rename = "TRIP_CREATED")]
    TripCreated(Trip),

    #[serde(rename = "TRIP_CLOSED")]
    TripClosed {
        trip_id: u64,
        exit_tollbooth_id: String,
        exit_at: DateTime<Utc>,
        amount_cents: i64,
        paid: bool,
    },

    #[serde(rename = "TRIP_PAID")]
    TripPaid { trip_id: u64 },

    #[serde(rename = "DEBT_CREATED")]
    DebtCreated(Debt),

    #[serde(rename = "DEBT_PAID")]
    DebtPaid { debt_id: u64 },
}

#[derive(Default)]
struct Tables {
    trips: HashMap<u64, Trip>,
    debts: HashMap<u64, Debt>,
    next_trip_id: u64,
    next_debt_id: u64,
}

impl Tables {
    fn apply(&mut self, entry: WalEntry) {
        match entry {
            WalEntry::TripCreated(trip) => {
                self.next_trip_id = self.next_trip_id.max(trip.id + 1);
                self.trips.insert(trip.id, trip);
            }
            WalEntry::TripClosed {
                trip_id,
                exit_tollbooth_id,
                exit_at,
                amount_cents,
                paid,
            } => {
                if let Some(trip) = self.trips.get_mut(&trip_id) {
                    trip.exit_tollbooth_id = Some(exit_tollbooth_id);
                    trip.exit_at = Some(exit_at);
                    trip.amount_cents = Some(amount_cents);
                    trip.paid = paid;
                }
            }
            WalEntry::TripPaid { trip_id } => {
                if let Some(trip) = self.trips.get_mut(&trip_id) {
                    trip.paid = true;
                }
            }
            WalEntry::DebtCreated(debt) => {
                self.next_debt_id = self.next_debt_id.max(debt.id + 1);
                self.debts.insert(debt.id, debt);
            }
            WalEntry::DebtPaid { debt_id } => {
                if let Some(debt) = self.debts.get_mut(&debt_id) {
                    debt.status = DebtStatus::Paid;
                }
            }
        }
    }
}

struct Inner {
    tables: Tables,
    wal: Option<BufWriter<File>>,
    fsync_on_write: bool,
}

/// Trip/debt ledger, owned exclusively by the pricing responder
pub struct LedgerStore {
    inner: Mutex<Inner>,
}

impl LedgerStore {
    /// Volatile store with no log; the test twin
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tables: Tables::default(),
                wal: None,
                fsync_on_write: false,
            }),
        }
    }

    /// Open (or create) a ledger directory, replaying the log
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with(dir, true)
    }

    /// Open with an explicit sync policy
    pub fn open_with(dir: impl AsRef<Path>, fsync_on_write: bool) -> io::Result<Self> {
        let dir: PathBuf = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let wal_path = dir.join(WAL_FILE);
        let mut tables = Tables::default();

        if wal_path.exists() {
            let reader = BufReader::new(File::open(&wal_path)?);
            let mut replayed = 0usize;
            for (line_num, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Ledger WAL read error at line {}: {}", line_num + 1, e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalEntry>(&line) {
                    Ok(entry) => {
                        tables.apply(entry);
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!("Ledger WAL parse error at line {}: {}", line_num + 1, e);
                    }
                }
            }
            info!(
                "Ledger recovered: {} entries, {} trips, {} debts",
                replayed,
                tables.trips.len(),
                tables.debts.len()
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&wal_path)?;
        debug!("Ledger WAL open at {:?}", wal_path);

        Ok(Self {
            inner: Mutex::new(Inner {
                tables,
                wal: Some(BufWriter::new(file)),
                fsync_on_write,
            }),
        })
    }

    fn append(inner: &mut Inner, entry: &WalEntry) -> io::Result<()> {
        if let Some(wal) = inner.wal.as_mut() {
            let line = serde_json::to_string(entry)?;
            writeln!(wal, "{}", line)?;
            if inner.fsync_on_write {
                wal.flush()?;
            }
        }
        Ok(())
    }

    fn create_trip(
        &self,
        entry_tollbooth_id: &str,
        plate: &str,
        ticket_id: Option<&str>,
        telepass_id: Option<&str>,
        entry_at: DateTime<Utc>,
    ) -> io::Result<u64> {
        let mut inner = self.inner.lock();
        let id = inner.tables.next_trip_id.max(1);

        let trip = Trip {
            id,
            entry_tollbooth_id: entry_tollbooth_id.to_string(),
            exit_tollbooth_id: None,
            ticket_id: ticket_id.map(str::to_string),
            telepass_id: telepass_id.map(str::to_string),
            plate: plate.to_string(),
            entry_at,
            exit_at: None,
            amount_cents: None,
            currency: CURRENCY.to_string(),
            paid: false,
        };

        let entry = WalEntry::TripCreated(trip);
        Self::append(&mut inner, &entry)?;
        inner.tables.apply(entry);
        Ok(id)
    }

    /// Open a ticket-keyed trip
    pub fn create_trip_manual(
        &self,
        entry_tollbooth_id: &str,
        plate: &str,
        ticket_id: &str,
        entry_at: DateTime<Utc>,
    ) -> io::Result<u64> {
        self.create_trip(entry_tollbooth_id, plate, Some(ticket_id), None, entry_at)
    }

    /// Open a telepass-keyed trip
    pub fn create_trip_telepass(
        &self,
        entry_tollbooth_id: &str,
        plate: &str,
        telepass_id: &str,
        entry_at: DateTime<Utc>,
    ) -> io::Result<u64> {
        self.create_trip(entry_tollbooth_id, plate, None, Some(telepass_id), entry_at)
    }

    /// Most recent open trip for a ticket (latest entry time wins)
    pub fn find_active_trip_by_ticket(&self, ticket_id: &str) -> Option<u64> {
        let inner = self.inner.lock();
        inner
            .tables
            .trips
            .values()
            .filter(|t| t.is_active() && t.ticket_id.as_deref() == Some(ticket_id))
            .max_by_key(|t| (t.entry_at, t.id))
            .map(|t| t.id)
    }

    /// Most recent open trip for a telepass (latest entry time wins)
    pub fn find_active_trip_by_telepass(&self, telepass_id: &str) -> Option<u64> {
        let inner = self.inner.lock();
        inner
            .tables
            .trips
            .values()
            .filter(|t| t.is_active() && t.telepass_id.as_deref() == Some(telepass_id))
            .max_by_key(|t| (t.entry_at, t.id))
            .map(|t| t.id)
    }

    /// Close a trip with its exit booth, timestamp, amount and paid flag
    pub fn close_trip(
        &self,
        trip_id: u64,
        exit_tollbooth_id: &str,
        exit_at: DateTime<Utc>,
        amount_cents: i64,
        paid: bool,
    ) -> io::Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.tables.trips.contains_key(&trip_id) {
            return Ok(false);
        }

        let entry = WalEntry::TripClosed {
            trip_id,
            exit_tollbooth_id: exit_tollbooth_id.to_string(),
            exit_at,
            amount_cents,
            paid,
        };
        Self::append(&mut inner, &entry)?;
        inner.tables.apply(entry);
        Ok(true)
    }

    /// Flip a trip's paid flag (the one mutation allowed after close)
    pub fn mark_trip_paid(&self, trip_id: u64) -> io::Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.tables.trips.contains_key(&trip_id) {
            return Ok(false);
        }

        let entry = WalEntry::TripPaid { trip_id };
        Self::append(&mut inner, &entry)?;
        inner.tables.apply(entry);
        Ok(true)
    }

    /// Record an OPEN debt for a telepass exit
    pub fn create_debt(
        &self,
        telepass_id: &str,
        trip_id: u64,
        amount_cents: i64,
        created_at: DateTime<Utc>,
    ) -> io::Result<u64> {
        let mut inner = self.inner.lock();
        let id = inner.tables.next_debt_id.max(1);

        let debt = Debt {
            id,
            telepass_id: telepass_id.to_string(),
            trip_id,
            amount_cents,
            currency: CURRENCY.to_string(),
            status: DebtStatus::Open,
            created_at,
        };

        let entry = WalEntry::DebtCreated(debt);
        Self::append(&mut inner, &entry)?;
        inner.tables.apply(entry);
        Ok(id)
    }

    /// Debts of one telepass account, newest first
    pub fn debts_by_telepass(&self, telepass_id: &str) -> Vec<Debt> {
        let inner = self.inner.lock();
        let mut debts: Vec<Debt> = inner
            .tables
            .debts
            .values()
            .filter(|d| d.telepass_id == telepass_id)
            .cloned()
            .collect();
        debts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        debts
    }

    pub fn find_debt(&self, debt_id: u64) -> Option<Debt> {
        self.inner.lock().tables.debts.get(&debt_id).cloned()
    }

    /// Settle a debt; OPEN -> PAID exactly once.
    ///
    /// Returns the owning trip id when the transition happened, `None` for
    /// unknown or already-paid debts.
    pub fn mark_debt_paid(&self, debt_id: u64) -> io::Result<Option<u64>> {
        let mut inner = self.inner.lock();
        let trip_id = match inner.tables.debts.get(&debt_id) {
            Some(debt) if debt.status == DebtStatus::Open => debt.trip_id,
            _ => return Ok(None),
        };

        let entry = WalEntry::DebtPaid { debt_id };
        Self::append(&mut inner, &entry)?;
        inner.tables.apply(entry);
        Ok(Some(trip_id))
    }

    /// Sum of all OPEN debt amounts
    pub fn sum_open_debt_cents(&self) -> i64 {
        let inner = self.inner.lock();
        inner
            .tables
            .debts
            .values()
            .filter(|d| d.status == DebtStatus::Open)
            .map(|d| d.amount_cents)
            .sum()
    }

    /// Sum of amounts over paid, priced trips
    pub fn sum_collected_cents(&self) -> i64 {
        let inner = self.inner.lock();
        inner
            .tables
            .trips
            .values()
            .filter(|t| t.paid)
            .filter_map(|t| t.amount_cents)
            .sum()
    }

    pub fn trip(&self, trip_id: u64) -> Option<Trip> {
        self.inner.lock().tables.trips.get(&trip_id).cloned()
    }

    pub fn trip_count(&self) -> usize {
        self.inner.lock().tables.trips.len()
    }

    pub fn debt_count(&self) -> usize {
        self.inner.lock().tables.debts.len()
    }
}
