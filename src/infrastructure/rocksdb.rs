use crate::domain::ids::{BookingId, TicketId};
use crate::domain::ports::TicketStore;
use crate::domain::ticket::DisputeTicket;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for ticket records.
pub const CF_TICKETS: &str = "tickets";
/// Column Family for the booking -> ticket ids index.
pub const CF_BOOKING_INDEX: &str = "booking_index";

/// Persistent ticket store backed by RocksDB.
///
/// Values are JSON-encoded tickets in one column family, with a second
/// column family indexing the tickets of each booking. RocksDB gives no
/// multi-key transactions here, so all writes pass through a single-writer
/// gate and re-check the store invariants (active-per-booking, revision)
/// while holding it.
#[derive(Clone)]
pub struct RocksTicketStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksTicketStore {
    /// Opens or creates the database at `path`, ensuring both column
    /// families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_tickets = ColumnFamilyDescriptor::new(CF_TICKETS, Options::default());
        let cf_index = ColumnFamilyDescriptor::new(CF_BOOKING_INDEX, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_tickets, cf_index])
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EngineError::Storage(format!("column family {name} not found")))
    }

    fn load_ticket(&self, ticket_id: &TicketId) -> Result<Option<DisputeTicket>> {
        let cf = self.cf(CF_TICKETS)?;
        let bytes = self
            .db
            .get_cf(cf, ticket_id.to_string().as_bytes())
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn booking_ticket_ids(&self, booking_id: &BookingId) -> Result<Vec<TicketId>> {
        let cf = self.cf(CF_BOOKING_INDEX)?;
        let bytes = self
            .db
            .get_cf(cf, booking_id.as_str().as_bytes())
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        match bytes {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn put_ticket(&self, ticket: &DisputeTicket) -> Result<()> {
        let cf = self.cf(CF_TICKETS)?;
        self.db
            .put_cf(cf, ticket.id.to_string().as_bytes(), serde_json::to_vec(ticket)?)
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn active_for_booking_sync(&self, booking_id: &BookingId) -> Result<Option<DisputeTicket>> {
        for ticket_id in self.booking_ticket_ids(booking_id)? {
            if let Some(ticket) = self.load_ticket(&ticket_id)?
                && ticket.is_active()
            {
                return Ok(Some(ticket));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TicketStore for RocksTicketStore {
    async fn create(&self, mut ticket: DisputeTicket) -> Result<DisputeTicket> {
        let _gate = self.write_gate.lock().await;
        if ticket.is_active() && self.active_for_booking_sync(&ticket.booking_id)?.is_some() {
            return Err(EngineError::DuplicateActiveDispute(ticket.booking_id));
        }
        ticket.revision = 1;

        let mut ids = self.booking_ticket_ids(&ticket.booking_id)?;
        ids.push(ticket.id);
        let cf = self.cf(CF_BOOKING_INDEX)?;
        self.db
            .put_cf(cf, ticket.booking_id.as_str().as_bytes(), serde_json::to_vec(&ids)?)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        self.put_ticket(&ticket)?;
        Ok(ticket)
    }

    async fn get(&self, ticket_id: &TicketId) -> Result<Option<DisputeTicket>> {
        self.load_ticket(ticket_id)
    }

    async fn active_for_booking(&self, booking_id: &BookingId) -> Result<Option<DisputeTicket>> {
        self.active_for_booking_sync(booking_id)
    }

    async fn all(&self) -> Result<Vec<DisputeTicket>> {
        let cf = self.cf(CF_TICKETS)?;
        let mut tickets = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| EngineError::Storage(e.to_string()))?;
            tickets.push(serde_json::from_slice::<DisputeTicket>(&value)?);
        }
        tickets.sort_by_key(|ticket| ticket.created_at);
        Ok(tickets)
    }

    async fn update(&self, mut ticket: DisputeTicket, expected_revision: u64) -> Result<DisputeTicket> {
        let _gate = self.write_gate.lock().await;
        let current = self
            .load_ticket(&ticket.id)?
            .ok_or(EngineError::TicketNotFound(ticket.id))?;
        if current.revision != expected_revision {
            return Err(EngineError::ConcurrentModification(ticket.id));
        }
        ticket.revision = expected_revision + 1;
        self.put_ticket(&ticket)?;
        Ok(ticket)
    }
}
