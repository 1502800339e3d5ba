//! Pure transition planning for the dispute state machine.
//!
//! Each planner validates the guard conditions of one transition against a
//! snapshot of the ticket and booking, and returns the intended state change
//! plus any side-effect request. Nothing here touches a store, a clock or the
//! settlement gateway; the coordinator executes the plan atomically.

use crate::domain::booking::BookingContext;
use crate::domain::ids::{ActorId, PaymentId};
use crate::domain::money::Money;
use crate::domain::ticket::{
    DisputeMessage, DisputeTicket, Resolution, ResolutionAction, TicketStatus,
};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoachDecision {
    Approve,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDecision {
    Approve,
    Deny,
}

/// A refund the executor must obtain from the settlement gateway before the
/// planned ticket state may be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundInstruction {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub reason: String,
}

/// The outcome of a planner: the ticket state to commit and the side effects
/// that belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub next_status: TicketStatus,
    pub resolution: Option<Resolution>,
    pub refund: Option<RefundInstruction>,
    pub note: Option<DisputeMessage>,
}

fn note_from(sender: &ActorId, content: &Option<String>, now: DateTime<Utc>) -> Option<DisputeMessage> {
    content.as_ref().map(|content| DisputeMessage {
        sender_id: sender.clone(),
        content: content.clone(),
        timestamp: now,
    })
}

fn ensure_positive(amount: &Money, what: &str) -> Result<()> {
    if amount.is_zero() {
        return Err(EngineError::Validation(format!(
            "{what} must be greater than zero"
        )));
    }
    Ok(())
}

fn ensure_within_refundable(amount: &Money, max_refundable: &Money) -> Result<()> {
    if amount.compare(max_refundable)? == Ordering::Greater {
        return Err(EngineError::InvalidRefundAmount {
            requested: amount.to_string(),
            max_refundable: max_refundable.to_string(),
        });
    }
    Ok(())
}

/// Validates a new refund request and builds the ticket to persist.
///
/// The at-most-one-active-per-booking invariant needs store knowledge and is
/// checked by the coordinator and again by the store at write time.
pub fn plan_creation(
    booking: &BookingContext,
    client_id: &ActorId,
    requested: Money,
    reason: &str,
    escalate: bool,
    now: DateTime<Utc>,
) -> Result<DisputeTicket> {
    if &booking.client_id != client_id {
        return Err(EngineError::Validation(format!(
            "client {client_id} does not own booking {}",
            booking.booking_id
        )));
    }
    if reason.trim().is_empty() {
        return Err(EngineError::Validation(
            "a refund request requires a reason".to_owned(),
        ));
    }
    ensure_positive(&requested, "requested refund")?;
    booking.payment.validate()?;
    if requested.currency() != booking.payment.amount_paid.currency() {
        return Err(EngineError::CurrencyMismatch {
            expected: booking.payment.amount_paid.currency().code().to_owned(),
            actual: requested.currency().code().to_owned(),
        });
    }
    if requested.compare(&booking.payment.amount_paid)? == Ordering::Greater {
        return Err(EngineError::Validation(format!(
            "requested refund {requested} exceeds the amount paid {}",
            booking.payment.amount_paid
        )));
    }

    let status = if escalate {
        TicketStatus::EscalatedToAdmin
    } else {
        TicketStatus::AwaitingCoachResponse
    };
    let opening = DisputeMessage {
        sender_id: client_id.clone(),
        content: reason.to_owned(),
        timestamp: now,
    };
    Ok(DisputeTicket::open(
        client_id.clone(),
        booking.booking_id.clone(),
        booking.payment.payment_id.clone(),
        status,
        requested,
        Some(opening),
        now,
    ))
}

/// Coach answer to a ticket awaiting their response.
///
/// Approving the full refundable balance closes the ticket; a partial
/// approval leaves the client the right to escalate. Declining moves the
/// ticket to the admin without moving money.
pub fn plan_coach_response(
    ticket: &DisputeTicket,
    booking: &BookingContext,
    coach_id: &ActorId,
    decision: CoachDecision,
    approved_amount: Option<Money>,
    message: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransitionPlan> {
    if ticket.status != TicketStatus::AwaitingCoachResponse {
        return Err(EngineError::InvalidTransition {
            ticket: ticket.id,
            status: ticket.status,
            attempted: "respond as coach",
        });
    }
    if &booking.coach_id != coach_id {
        return Err(EngineError::Validation(format!(
            "coach {coach_id} does not own booking {}",
            booking.booking_id
        )));
    }

    match decision {
        CoachDecision::Decline => Ok(TransitionPlan {
            next_status: TicketStatus::EscalatedToAdmin,
            resolution: None,
            refund: None,
            note: note_from(coach_id, &message, now),
        }),
        CoachDecision::Approve => {
            let amount = approved_amount.ok_or_else(|| {
                EngineError::Validation("an approval requires an approved amount".to_owned())
            })?;
            ensure_positive(&amount, "approved refund")?;
            let max_refundable = booking.max_refundable(&ticket.refunded_total)?;
            ensure_within_refundable(&amount, &max_refundable)?;

            let full = amount.compare(&max_refundable)? == Ordering::Equal;
            let next_status = if full {
                TicketStatus::Closed
            } else {
                TicketStatus::ResolvedByCoach
            };
            let resolution = Resolution {
                action: ResolutionAction::RefundApproved,
                resolved_by: coach_id.clone(),
                resolved_at: now,
                final_refund: amount.clone(),
                policy_applied: None,
                notes: message.clone(),
            };
            let refund = RefundInstruction {
                payment_id: ticket.payment_id.clone(),
                amount,
                reason: format!("coach approval for dispute {}", ticket.id),
            };
            Ok(TransitionPlan {
                next_status,
                resolution: Some(resolution),
                refund: Some(refund),
                note: note_from(coach_id, &message, now),
            })
        }
    }
}

/// Client rejecting a coach's partial resolution. No money moves here.
pub fn plan_client_escalation(
    ticket: &DisputeTicket,
    client_id: &ActorId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionPlan> {
    if ticket.status != TicketStatus::ResolvedByCoach {
        return Err(EngineError::InvalidTransition {
            ticket: ticket.id,
            status: ticket.status,
            attempted: "escalate as client",
        });
    }
    if &ticket.client_id != client_id {
        return Err(EngineError::Validation(format!(
            "client {client_id} does not own ticket {}",
            ticket.id
        )));
    }
    if reason.trim().is_empty() {
        return Err(EngineError::Validation(
            "an escalation requires a reason".to_owned(),
        ));
    }
    Ok(TransitionPlan {
        next_status: TicketStatus::EscalatedToAdmin,
        resolution: None,
        refund: None,
        note: note_from(client_id, &Some(reason.to_owned()), now),
    })
}

/// Final admin decision on an escalated ticket. The approved amount is an
/// administrator override bounded only by the refundable balance, never
/// recomputed from the cancellation policy.
#[allow(clippy::too_many_arguments)]
pub fn plan_admin_resolution(
    ticket: &DisputeTicket,
    booking: &BookingContext,
    admin_id: &ActorId,
    decision: AdminDecision,
    final_amount: Money,
    policy_applied: Option<String>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransitionPlan> {
    if ticket.status != TicketStatus::EscalatedToAdmin {
        return Err(EngineError::InvalidTransition {
            ticket: ticket.id,
            status: ticket.status,
            attempted: "resolve as admin",
        });
    }

    let (action, refund, final_refund) = match decision {
        AdminDecision::Approve => {
            let max_refundable = booking.max_refundable(&ticket.refunded_total)?;
            ensure_within_refundable(&final_amount, &max_refundable)?;
            let refund = (!final_amount.is_zero()).then(|| RefundInstruction {
                payment_id: ticket.payment_id.clone(),
                amount: final_amount.clone(),
                reason: format!("admin resolution for dispute {}", ticket.id),
            });
            (ResolutionAction::RefundApproved, refund, final_amount)
        }
        AdminDecision::Deny => (
            ResolutionAction::RefundDenied,
            None,
            Money::zero(final_amount.currency().clone()),
        ),
    };

    let resolution = Resolution {
        action,
        resolved_by: admin_id.clone(),
        resolved_at: now,
        final_refund,
        policy_applied,
        notes: notes.clone(),
    };
    Ok(TransitionPlan {
        next_status: TicketStatus::Closed,
        resolution: Some(resolution),
        refund,
        note: note_from(admin_id, &notes, now),
    })
}
