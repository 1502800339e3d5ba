use crate::domain::ids::{BookingId, PaymentId, TicketId};
use crate::domain::ticket::TicketStatus;
use thiserror::Error;

/// Error taxonomy of the dispute engine.
///
/// Variants fall into four families with distinct caller contracts:
/// validation errors (correct and resubmit), conflict errors (re-fetch and
/// decide whether to retry), settlement errors (the whole operation aborted,
/// retry is safe), and fatal inconsistencies (never auto-retried).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid cancellation policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid payment context: {0}")]
    InvalidPaymentContext(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    #[error("dispute ticket {0} not found")]
    TicketNotFound(TicketId),

    #[error("an active dispute already exists for booking {0}")]
    DuplicateActiveDispute(BookingId),

    #[error("ticket {ticket} is {status}, cannot {attempted}")]
    InvalidTransition {
        ticket: TicketId,
        status: TicketStatus,
        attempted: &'static str,
    },

    #[error("refund amount {requested} exceeds refundable balance {max_refundable}")]
    InvalidRefundAmount {
        requested: String,
        max_refundable: String,
    },

    #[error("settlement failed for payment {payment}: {reason}")]
    SettlementFailed { payment: PaymentId, reason: String },

    #[error("ticket {0} was modified concurrently; retry from a fresh read")]
    ConcurrentModification(TicketId),

    /// The gateway confirmed a refund but the conditional ticket write did
    /// not go through. Retrying could move money twice; a human has to
    /// reconcile using the settlement outcome id.
    #[error(
        "refund {outcome_id} succeeded but ticket {ticket} could not be committed; \
         manual reconciliation required"
    )]
    ReconciliationRequired {
        ticket: TicketId,
        outcome_id: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    /// True when the caller may safely re-run the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification(_) | EngineError::SettlementFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
