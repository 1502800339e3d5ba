use crate::domain::booking::BookingContext;
use crate::domain::ids::{BookingId, TicketId};
use crate::domain::ports::{BookingDirectory, TicketStore};
use crate::domain::ticket::DisputeTicket;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory ticket store.
///
/// Holds tickets plus a booking index in one `RwLock`, so the invariant
/// re-checks (`DuplicateActiveDispute` on create, revision match on update)
/// happen atomically with the write.
#[derive(Default, Clone)]
pub struct InMemoryTicketStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    tickets: HashMap<TicketId, DisputeTicket>,
    by_booking: HashMap<BookingId, Vec<TicketId>>,
}

impl StoreInner {
    fn active_for_booking(&self, booking_id: &BookingId) -> Option<&DisputeTicket> {
        self.by_booking
            .get(booking_id)?
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .find(|ticket| ticket.is_active())
    }
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create(&self, mut ticket: DisputeTicket) -> Result<DisputeTicket> {
        let mut inner = self.inner.write().await;
        if ticket.is_active() && inner.active_for_booking(&ticket.booking_id).is_some() {
            return Err(EngineError::DuplicateActiveDispute(ticket.booking_id));
        }
        ticket.revision = 1;
        inner
            .by_booking
            .entry(ticket.booking_id.clone())
            .or_default()
            .push(ticket.id);
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, ticket_id: &TicketId) -> Result<Option<DisputeTicket>> {
        let inner = self.inner.read().await;
        Ok(inner.tickets.get(ticket_id).cloned())
    }

    async fn active_for_booking(&self, booking_id: &BookingId) -> Result<Option<DisputeTicket>> {
        let inner = self.inner.read().await;
        Ok(inner.active_for_booking(booking_id).cloned())
    }

    async fn all(&self) -> Result<Vec<DisputeTicket>> {
        let inner = self.inner.read().await;
        let mut tickets: Vec<DisputeTicket> = inner.tickets.values().cloned().collect();
        tickets.sort_by_key(|ticket| ticket.created_at);
        Ok(tickets)
    }

    async fn update(&self, mut ticket: DisputeTicket, expected_revision: u64) -> Result<DisputeTicket> {
        let mut inner = self.inner.write().await;
        let current = inner
            .tickets
            .get(&ticket.id)
            .ok_or(EngineError::TicketNotFound(ticket.id))?;
        if current.revision != expected_revision {
            return Err(EngineError::ConcurrentModification(ticket.id));
        }
        ticket.revision = expected_revision + 1;
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }
}

/// In-memory booking/payment lookup, seeded up front. Read-only to the
/// engine, like the real directory.
#[derive(Default, Clone)]
pub struct InMemoryBookingDirectory {
    bookings: Arc<HashMap<BookingId, BookingContext>>,
}

impl InMemoryBookingDirectory {
    pub fn new(bookings: impl IntoIterator<Item = BookingContext>) -> Self {
        Self {
            bookings: Arc::new(
                bookings
                    .into_iter()
                    .map(|booking| (booking.booking_id.clone(), booking))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl BookingDirectory for InMemoryBookingDirectory {
    async fn booking(&self, booking_id: &BookingId) -> Result<Option<BookingContext>> {
        Ok(self.bookings.get(booking_id).cloned())
    }
}
