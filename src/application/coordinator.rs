use crate::domain::booking::BookingContext;
use crate::domain::ids::{ActorId, BookingId, TicketId};
use crate::domain::money::Money;
use crate::domain::policy::{self, RefundOutcome};
use crate::domain::ports::{
    BookingDirectoryRef, DisputeEvent, NotificationEmitterRef, SettlementGatewayRef,
    SettlementStatus, TicketStoreRef,
};
use crate::domain::ticket::DisputeTicket;
use crate::domain::transition::{
    self, AdminDecision, CoachDecision, TransitionPlan,
};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};

/// The refund workflow coordinator: the engine's API towards the rest of the
/// platform.
///
/// Every operation follows the same shape: fetch current state, plan the
/// transition with the pure functions in [`crate::domain::transition`], then
/// execute the plan: settlement call first, conditional ticket write second,
/// notification fan-out only after the write committed.
pub struct RefundWorkflow {
    tickets: TicketStoreRef,
    directory: BookingDirectoryRef,
    settlement: SettlementGatewayRef,
    notifier: NotificationEmitterRef,
}

impl RefundWorkflow {
    pub fn new(
        tickets: TicketStoreRef,
        directory: BookingDirectoryRef,
        settlement: SettlementGatewayRef,
        notifier: NotificationEmitterRef,
    ) -> Self {
        Self {
            tickets,
            directory,
            settlement,
            notifier,
        }
    }

    /// Opens a dispute ticket for a paid booking. With `escalate` the ticket
    /// starts at the admin instead of the coach. At most one active ticket
    /// may exist per booking; a booking whose previous ticket ended in
    /// `closed` or `resolved_by_coach` can be disputed again with a fresh
    /// ticket.
    pub async fn create_refund_request(
        &self,
        client_id: ActorId,
        booking_id: BookingId,
        reason: &str,
        requested: Money,
        escalate: bool,
    ) -> Result<DisputeTicket> {
        let booking = self.booking(&booking_id).await?;
        if self.tickets.active_for_booking(&booking_id).await?.is_some() {
            return Err(EngineError::DuplicateActiveDispute(booking_id));
        }

        let ticket =
            transition::plan_creation(&booking, &client_id, requested, reason, escalate, Utc::now())?;
        let ticket = self.tickets.create(ticket).await?;
        tracing::info!(
            ticket = %ticket.id,
            booking = %ticket.booking_id,
            status = %ticket.status,
            "dispute ticket created"
        );

        self.notifier
            .notify(DisputeEvent::TicketCreated {
                ticket_id: ticket.id,
                booking_id: ticket.booking_id.clone(),
                recipient: booking.coach_id.clone(),
            })
            .await;
        Ok(ticket)
    }

    /// Coach answer to an open ticket: approve an amount (full approval
    /// closes the ticket, partial leaves the client the right to escalate)
    /// or decline, which hands the ticket to the admin.
    pub async fn respond_as_coach(
        &self,
        coach_id: ActorId,
        ticket_id: TicketId,
        decision: CoachDecision,
        approved_amount: Option<Money>,
        message: Option<String>,
    ) -> Result<DisputeTicket> {
        let ticket = self.ticket(&ticket_id).await?;
        let booking = self.booking(&ticket.booking_id).await?;
        let plan = transition::plan_coach_response(
            &ticket,
            &booking,
            &coach_id,
            decision,
            approved_amount,
            message,
            Utc::now(),
        )?;

        let updated = self.execute(ticket, plan).await?;
        self.notifier
            .notify(DisputeEvent::CoachResponded {
                ticket_id: updated.id,
                recipient: updated.client_id.clone(),
            })
            .await;
        Ok(updated)
    }

    /// Client rejecting a coach's partial resolution, moving the ticket to
    /// the admin. No money moves at this step.
    pub async fn escalate_as_client(
        &self,
        client_id: ActorId,
        ticket_id: TicketId,
        reason: &str,
    ) -> Result<DisputeTicket> {
        let ticket = self.ticket(&ticket_id).await?;
        let booking = self.booking(&ticket.booking_id).await?;
        let plan = transition::plan_client_escalation(&ticket, &client_id, reason, Utc::now())?;

        let updated = self.execute(ticket, plan).await?;
        self.notifier
            .notify(DisputeEvent::Escalated {
                ticket_id: updated.id,
                recipient: booking.coach_id.clone(),
            })
            .await;
        Ok(updated)
    }

    /// Final admin decision on an escalated ticket. The approved amount is
    /// the admin's override, bounded only by the refundable balance.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_as_admin(
        &self,
        admin_id: ActorId,
        ticket_id: TicketId,
        decision: AdminDecision,
        final_amount: Money,
        policy_applied: Option<String>,
        notes: Option<String>,
    ) -> Result<DisputeTicket> {
        let ticket = self.ticket(&ticket_id).await?;
        let booking = self.booking(&ticket.booking_id).await?;
        let plan = transition::plan_admin_resolution(
            &ticket,
            &booking,
            &admin_id,
            decision,
            final_amount,
            policy_applied,
            notes,
            Utc::now(),
        )?;

        let updated = self.execute(ticket, plan).await?;
        self.notifier
            .notify(DisputeEvent::Resolved {
                ticket_id: updated.id,
                recipient: updated.client_id.clone(),
            })
            .await;
        Ok(updated)
    }

    /// Read-only preview of what a cancellation would refund right now.
    pub async fn evaluate_cancellation(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome> {
        let booking = self.booking(booking_id).await?;
        policy::evaluate(
            booking.starts_at,
            &booking.policy,
            now,
            &booking.payment.amount_paid,
        )
    }

    pub async fn ticket(&self, ticket_id: &TicketId) -> Result<DisputeTicket> {
        self.tickets
            .get(ticket_id)
            .await?
            .ok_or(EngineError::TicketNotFound(*ticket_id))
    }

    pub async fn active_ticket_for_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<DisputeTicket>> {
        self.tickets.active_for_booking(booking_id).await
    }

    pub async fn all_tickets(&self) -> Result<Vec<DisputeTicket>> {
        self.tickets.all().await
    }

    async fn booking(&self, booking_id: &BookingId) -> Result<BookingContext> {
        self.directory
            .booking(booking_id)
            .await?
            .ok_or_else(|| EngineError::BookingNotFound(booking_id.clone()))
    }

    /// Executes a planned transition as one atomic unit.
    ///
    /// When the plan carries a refund, the gateway call happens strictly
    /// between guard validation and the conditional write. A gateway failure
    /// aborts with the ticket unchanged and the operation safely retryable.
    /// A write failure after the gateway confirmed the refund is the one
    /// state this engine cannot repair on its own; it surfaces as
    /// `ReconciliationRequired` and is never retried automatically.
    async fn execute(&self, ticket: DisputeTicket, plan: TransitionPlan) -> Result<DisputeTicket> {
        let expected_revision = ticket.revision;
        let mut next = ticket;
        next.status = plan.next_status;
        if let Some(note) = plan.note {
            next.append_message(note);
        }
        if let Some(resolution) = plan.resolution {
            next.resolution = Some(resolution);
        }
        next.updated_at = Utc::now();

        let receipt = if let Some(instruction) = &plan.refund {
            let receipt = self
                .settlement
                .refund(&instruction.payment_id, &instruction.amount, &instruction.reason)
                .await
                .map_err(|source| match source {
                    failed @ EngineError::SettlementFailed { .. } => failed,
                    other => EngineError::SettlementFailed {
                        payment: instruction.payment_id.clone(),
                        reason: other.to_string(),
                    },
                })?;
            if receipt.status == SettlementStatus::Failed {
                return Err(EngineError::SettlementFailed {
                    payment: instruction.payment_id.clone(),
                    reason: format!("processor declined refund {}", receipt.outcome_id),
                });
            }
            next.refunded_total = next.refunded_total.checked_add(&instruction.amount)?;
            tracing::info!(
                ticket = %next.id,
                payment = %instruction.payment_id,
                amount = %instruction.amount,
                outcome = %receipt.outcome_id,
                "refund settled, committing ticket"
            );
            Some(receipt)
        } else {
            None
        };

        let ticket_id = next.id;
        match self.tickets.update(next, expected_revision).await {
            Ok(updated) => {
                tracing::debug!(ticket = %updated.id, status = %updated.status, "ticket committed");
                Ok(updated)
            }
            Err(commit_error) => match receipt {
                // Money moved but the ticket did not: surface for manual
                // reconciliation, never retry.
                Some(receipt) => {
                    tracing::error!(
                        ticket = %ticket_id,
                        outcome = %receipt.outcome_id,
                        error = %commit_error,
                        "refund settled but ticket commit failed"
                    );
                    Err(EngineError::ReconciliationRequired {
                        ticket: ticket_id,
                        outcome_id: receipt.outcome_id,
                    })
                }
                None => Err(commit_error),
            },
        }
    }
}
