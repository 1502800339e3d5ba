use chrono::{Duration, Utc};
use disputekit::application::coordinator::RefundWorkflow;
use disputekit::domain::booking::{BookingContext, PaymentContext};
use disputekit::domain::ids::{ActorId, BookingId, PaymentId};
use disputekit::domain::money::{Currency, Money};
use disputekit::domain::policy::{CancellationPolicy, PolicyTier};
use disputekit::domain::ports::DisputeEvent;
use disputekit::domain::ticket::{ResolutionAction, TicketStatus};
use disputekit::domain::transition::{AdminDecision, CoachDecision};
use disputekit::error::EngineError;
use disputekit::infrastructure::in_memory::{InMemoryBookingDirectory, InMemoryTicketStore};
use disputekit::infrastructure::settlement::{
    InProcessSettlementGateway, RecordingNotificationEmitter,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn chf(amount: Decimal) -> Money {
    Money::new(amount, Currency::new("CHF").unwrap()).unwrap()
}

fn booking(id: &str, paid: Decimal, already_refunded: Decimal) -> BookingContext {
    BookingContext {
        booking_id: BookingId::from(id),
        client_id: ActorId::from("client-1"),
        coach_id: ActorId::from("coach-1"),
        starts_at: Utc::now() + Duration::hours(72),
        payment: PaymentContext {
            payment_id: PaymentId::new(format!("pay-{id}")),
            amount_paid: chf(paid),
            already_refunded: chf(already_refunded),
        },
        policy: CancellationPolicy::new(
            12,
            vec![
                PolicyTier::new(24, 100, "free_cancellation").unwrap(),
                PolicyTier::new(12, 50, "half_refund").unwrap(),
            ],
        )
        .unwrap(),
    }
}

struct Harness {
    workflow: RefundWorkflow,
    gateway: Arc<InProcessSettlementGateway>,
    notifier: Arc<RecordingNotificationEmitter>,
}

async fn harness(bookings: Vec<BookingContext>) -> Harness {
    let gateway = InProcessSettlementGateway::new();
    for b in &bookings {
        let open = b
            .payment
            .amount_paid
            .checked_sub(&b.payment.already_refunded)
            .unwrap();
        gateway.register_charge(b.payment.payment_id.clone(), open).await;
    }
    let notifier = RecordingNotificationEmitter::new();
    let workflow = RefundWorkflow::new(
        Arc::new(InMemoryTicketStore::new()),
        Arc::new(InMemoryBookingDirectory::new(bookings)),
        gateway.clone(),
        notifier.clone(),
    );
    Harness {
        workflow,
        gateway,
        notifier,
    }
}

#[tokio::test]
async fn coach_approving_the_full_balance_closes_the_ticket() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "coach cancelled the session",
            chf(dec!(100)),
            false,
        )
        .await
        .unwrap();

    let closed = h
        .workflow
        .respond_as_coach(
            ActorId::from("coach-1"),
            ticket.id,
            CoachDecision::Approve,
            Some(chf(dec!(100))),
            Some("apologies, full refund".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(closed.status, TicketStatus::Closed);
    let resolution = closed.resolution.as_ref().unwrap();
    assert_eq!(resolution.action, ResolutionAction::RefundApproved);
    assert_eq!(resolution.final_refund, chf(dec!(100)));

    let payment = PaymentId::from("pay-booking-1");
    assert_eq!(
        h.gateway.total_refunded(&payment).await.unwrap(),
        chf(dec!(100))
    );
}

#[tokio::test]
async fn partial_approval_then_escalation_then_admin_remainder() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "session was half as long as booked",
            chf(dec!(100)),
            false,
        )
        .await
        .unwrap();

    let partial = h
        .workflow
        .respond_as_coach(
            ActorId::from("coach-1"),
            ticket.id,
            CoachDecision::Approve,
            Some(chf(dec!(40))),
            Some("offering 40 back".to_owned()),
        )
        .await
        .unwrap();
    assert_eq!(partial.status, TicketStatus::ResolvedByCoach);
    assert_eq!(partial.refunded_total, chf(dec!(40)));

    // A partially resolved ticket is no longer active; the booking could be
    // disputed again, but the client keeps the right to escalate this one.
    let escalated = h
        .workflow
        .escalate_as_client(
            ActorId::from("client-1"),
            ticket.id,
            "40 does not cover half the session",
        )
        .await
        .unwrap();
    assert_eq!(escalated.status, TicketStatus::EscalatedToAdmin);

    let resolved = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Approve,
            chf(dec!(60)),
            Some("half_refund".to_owned()),
            Some("granting the remainder".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(resolved.status, TicketStatus::Closed);
    assert_eq!(resolved.refunded_total, chf(dec!(100)));
    let resolution = resolved.resolution.as_ref().unwrap();
    assert_eq!(resolution.resolved_by, ActorId::from("admin-1"));
    assert_eq!(resolution.final_refund, chf(dec!(60)));

    // Exactly two settlement calls: the coach's 40 and the admin's 60.
    assert_eq!(h.gateway.refund_calls().await.len(), 2);
    assert_eq!(
        h.gateway
            .total_refunded(&PaymentId::from("pay-booking-1"))
            .await
            .unwrap(),
        chf(dec!(100))
    );
}

#[tokio::test]
async fn coach_decline_escalates_and_keeps_the_note() {
    let h = harness(vec![booking("booking-1", dec!(80), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "did not like the session",
            chf(dec!(80)),
            false,
        )
        .await
        .unwrap();

    let escalated = h
        .workflow
        .respond_as_coach(
            ActorId::from("coach-1"),
            ticket.id,
            CoachDecision::Decline,
            None,
            Some("session was delivered as booked".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(escalated.status, TicketStatus::EscalatedToAdmin);
    assert!(escalated.resolution.is_none());
    assert!(
        escalated
            .messages
            .iter()
            .any(|m| m.content == "session was delivered as booked")
    );
    assert!(h.gateway.refund_calls().await.is_empty());
}

#[tokio::test]
async fn admin_cannot_exceed_the_refundable_balance() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(30))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "charged too much",
            chf(dec!(70)),
            true,
        )
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::EscalatedToAdmin);

    let over = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Approve,
            chf(dec!(71)),
            None,
            None,
        )
        .await;
    assert!(matches!(over, Err(EngineError::InvalidRefundAmount { .. })));

    // The rejected resolution left the ticket untouched.
    let unchanged = h.workflow.ticket(&ticket.id).await.unwrap();
    assert_eq!(unchanged.status, TicketStatus::EscalatedToAdmin);
    assert_eq!(unchanged.revision, ticket.revision);
    assert!(h.gateway.refund_calls().await.is_empty());
}

#[tokio::test]
async fn admin_deny_closes_without_moving_money() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "want my money back",
            chf(dec!(100)),
            true,
        )
        .await
        .unwrap();

    let denied = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Deny,
            chf(dec!(0)),
            None,
            Some("cancellation was inside the no-refund window".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(denied.status, TicketStatus::Closed);
    assert_eq!(
        denied.resolution.as_ref().unwrap().action,
        ResolutionAction::RefundDenied
    );
    assert!(denied.refunded_total.is_zero());
    assert!(h.gateway.refund_calls().await.is_empty());
}

#[tokio::test]
async fn a_booking_can_be_disputed_again_after_closure() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let first = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "first complaint",
            chf(dec!(30)),
            true,
        )
        .await
        .unwrap();

    // Active ticket blocks a second request, escalated or not.
    let blocked = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "second complaint",
            chf(dec!(30)),
            false,
        )
        .await;
    assert!(matches!(
        blocked,
        Err(EngineError::DuplicateActiveDispute(_))
    ));

    h.workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            first.id,
            AdminDecision::Deny,
            chf(dec!(0)),
            None,
            None,
        )
        .await
        .unwrap();

    let reopened = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "new evidence",
            chf(dec!(30)),
            false,
        )
        .await
        .unwrap();
    assert_ne!(reopened.id, first.id);
    assert_eq!(reopened.status, TicketStatus::AwaitingCoachResponse);
}

#[tokio::test]
async fn settlement_failure_rolls_back_admin_resolution() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "no-show",
            chf(dec!(100)),
            true,
        )
        .await
        .unwrap();

    h.gateway.fail_next_refunds(1);
    let failed = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Approve,
            chf(dec!(100)),
            None,
            None,
        )
        .await;
    assert!(matches!(failed, Err(EngineError::SettlementFailed { .. })));

    let unchanged = h.workflow.ticket(&ticket.id).await.unwrap();
    assert_eq!(unchanged.status, TicketStatus::EscalatedToAdmin);
    assert!(unchanged.resolution.is_none());
    assert!(unchanged.refunded_total.is_zero());

    // Retrying the same resolution succeeds and moves the money once.
    let resolved = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Approve,
            chf(dec!(100)),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, TicketStatus::Closed);
    assert_eq!(
        h.gateway
            .total_refunded(&PaymentId::from("pay-booking-1"))
            .await
            .unwrap(),
        chf(dec!(100))
    );
}

#[tokio::test]
async fn every_transition_notifies_after_commit() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "session quality",
            chf(dec!(100)),
            false,
        )
        .await
        .unwrap();
    h.workflow
        .respond_as_coach(
            ActorId::from("coach-1"),
            ticket.id,
            CoachDecision::Approve,
            Some(chf(dec!(50))),
            None,
        )
        .await
        .unwrap();
    h.workflow
        .escalate_as_client(ActorId::from("client-1"), ticket.id, "not enough")
        .await
        .unwrap();
    h.workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Deny,
            chf(dec!(0)),
            None,
            None,
        )
        .await
        .unwrap();

    let events = h.notifier.events().await;
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], DisputeEvent::TicketCreated { .. }));
    assert!(matches!(events[1], DisputeEvent::CoachResponded { .. }));
    assert!(matches!(events[2], DisputeEvent::Escalated { .. }));
    assert!(matches!(events[3], DisputeEvent::Resolved { .. }));
}

#[tokio::test]
async fn failed_transition_does_not_notify() {
    let h = harness(vec![booking("booking-1", dec!(100), dec!(0))]).await;
    let ticket = h
        .workflow
        .create_refund_request(
            ActorId::from("client-1"),
            BookingId::from("booking-1"),
            "no-show",
            chf(dec!(100)),
            true,
        )
        .await
        .unwrap();

    h.gateway.fail_next_refunds(1);
    let _ = h
        .workflow
        .resolve_as_admin(
            ActorId::from("admin-1"),
            ticket.id,
            AdminDecision::Approve,
            chf(dec!(100)),
            None,
            None,
        )
        .await;

    let events = h.notifier.events().await;
    // Only the creation event; the failed resolution stayed silent.
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], DisputeEvent::TicketCreated { .. }));
}

#[tokio::test]
async fn cancellation_preview_uses_the_booking_policy() {
    let b = booking("booking-1", dec!(100), dec!(0));
    let starts_at = b.starts_at;
    let h = harness(vec![b]).await;

    // 20 hours of notice on the {24: 100%, 12: 50%} policy.
    let outcome = h
        .workflow
        .evaluate_cancellation(
            &BookingId::from("booking-1"),
            starts_at - Duration::hours(20),
        )
        .await
        .unwrap();
    assert!(outcome.eligible);
    assert_eq!(outcome.refund_percentage, 50);
    assert_eq!(outcome.gross_refund, chf(dec!(50.00)));

    // 6 hours of notice violates the 12 hour minimum.
    let blocked = h
        .workflow
        .evaluate_cancellation(
            &BookingId::from("booking-1"),
            starts_at - Duration::hours(6),
        )
        .await
        .unwrap();
    assert!(!blocked.eligible);
}
