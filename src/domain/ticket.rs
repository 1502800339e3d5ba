use crate::domain::ids::{ActorId, BookingId, PaymentId, TicketId};
use crate::domain::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a dispute ticket.
///
/// `AwaitingCoachResponse` and `EscalatedToAdmin` are the active states; a
/// booking can carry at most one active ticket at a time. A ticket is never
/// deleted, it is archived in place via `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    AwaitingCoachResponse,
    EscalatedToAdmin,
    ResolvedByCoach,
    Closed,
}

impl TicketStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TicketStatus::AwaitingCoachResponse | TicketStatus::EscalatedToAdmin
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TicketStatus::AwaitingCoachResponse => "awaiting_coach_response",
            TicketStatus::EscalatedToAdmin => "escalated_to_admin",
            TicketStatus::ResolvedByCoach => "resolved_by_coach",
            TicketStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// One entry of the append-only message trail on a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeMessage {
    pub sender_id: ActorId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    RefundApproved,
    RefundDenied,
    NoAction,
}

/// How a ticket was settled. Written on transitions into `Closed` or
/// `ResolvedByCoach`; an admin resolution after escalation replaces a coach's
/// partial one, with the message trail keeping the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub action: ResolutionAction,
    pub resolved_by: ActorId,
    pub resolved_at: DateTime<Utc>,
    pub final_refund: Money,
    pub policy_applied: Option<String>,
    pub notes: Option<String>,
}

/// The persisted record of one refund request and its full lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeTicket {
    pub id: TicketId,
    pub client_id: ActorId,
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub status: TicketStatus,
    pub requested_refund: Money,
    pub messages: Vec<DisputeMessage>,
    pub resolution: Option<Resolution>,
    /// Total refunded through this ticket so far; grows in the same
    /// conditional write as the settlement call that moved the money.
    pub refunded_total: Money,
    /// Optimistic-concurrency token; every store write bumps it.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DisputeTicket {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        client_id: ActorId,
        booking_id: BookingId,
        payment_id: PaymentId,
        status: TicketStatus,
        requested_refund: Money,
        opening_message: Option<DisputeMessage>,
        now: DateTime<Utc>,
    ) -> Self {
        let zero = Money::zero(requested_refund.currency().clone());
        Self {
            id: TicketId::new(),
            client_id,
            booking_id,
            payment_id,
            status,
            requested_refund,
            messages: opening_message.into_iter().collect(),
            resolution: None,
            refunded_total: zero,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn append_message(&mut self, message: DisputeMessage) {
        self.messages.push(message);
    }
}
