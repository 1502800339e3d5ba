use crate::domain::booking::BookingContext;
use crate::domain::ids::{ActorId, BookingId, PaymentId, TicketId};
use crate::domain::money::Money;
use crate::domain::ticket::DisputeTicket;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Persistence port for dispute tickets.
///
/// The coordinator validates invariants before calling in; implementations
/// re-check them under their own lock to guard against races: `create` fails
/// with `DuplicateActiveDispute` when the booking already has an active
/// ticket, and `update` fails with `ConcurrentModification` unless the stored
/// revision still equals `expected_revision`.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, ticket: DisputeTicket) -> Result<DisputeTicket>;
    async fn get(&self, ticket_id: &TicketId) -> Result<Option<DisputeTicket>>;
    /// At most one ticket per booking can be active at a time.
    async fn active_for_booking(&self, booking_id: &BookingId) -> Result<Option<DisputeTicket>>;
    async fn all(&self) -> Result<Vec<DisputeTicket>>;
    async fn update(&self, ticket: DisputeTicket, expected_revision: u64) -> Result<DisputeTicket>;
}

/// Read-only lookup of booking and payment context.
#[async_trait]
pub trait BookingDirectory: Send + Sync {
    async fn booking(&self, booking_id: &BookingId) -> Result<Option<BookingContext>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Succeeded,
    Failed,
}

/// Definitive answer of the payment processor for one refund attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub outcome_id: String,
    pub status: SettlementStatus,
    pub amount_refunded: Money,
}

/// External capability that actually moves money. At-most-once per
/// invocation; a timeout must surface as an `Err`, never as success.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn refund(
        &self,
        payment_id: &PaymentId,
        amount: &Money,
        reason: &str,
    ) -> Result<SettlementReceipt>;
}

/// State transitions the rest of the platform gets told about, after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DisputeEvent {
    TicketCreated {
        ticket_id: TicketId,
        booking_id: BookingId,
        recipient: ActorId,
    },
    CoachResponded {
        ticket_id: TicketId,
        recipient: ActorId,
    },
    Escalated {
        ticket_id: TicketId,
        recipient: ActorId,
    },
    Resolved {
        ticket_id: TicketId,
        recipient: ActorId,
    },
}

/// Fire-and-forget fan-out. Implementations own their failure handling; the
/// engine never fails an operation because a notification did not go out.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn notify(&self, event: DisputeEvent);
}

pub type TicketStoreRef = Arc<dyn TicketStore>;
pub type BookingDirectoryRef = Arc<dyn BookingDirectory>;
pub type SettlementGatewayRef = Arc<dyn SettlementGateway>;
pub type NotificationEmitterRef = Arc<dyn NotificationEmitter>;
