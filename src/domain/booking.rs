use crate::domain::ids::{ActorId, BookingId, PaymentId};
use crate::domain::money::Money;
use crate::domain::policy::CancellationPolicy;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment details of a booking as recorded by the payment processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentContext {
    pub payment_id: PaymentId,
    pub amount_paid: Money,
    /// Refunds already issued outside the engine (goodwill refunds,
    /// processor-side reversals). Refunds executed through a dispute ticket
    /// are tracked on the ticket itself.
    pub already_refunded: Money,
}

impl PaymentContext {
    pub fn validate(&self) -> Result<()> {
        if self.amount_paid.currency() != self.already_refunded.currency() {
            return Err(EngineError::InvalidPaymentContext(format!(
                "payment {} mixes currencies {} and {}",
                self.payment_id,
                self.amount_paid.currency(),
                self.already_refunded.currency()
            )));
        }
        if self.already_refunded.compare(&self.amount_paid)? == std::cmp::Ordering::Greater {
            return Err(EngineError::InvalidPaymentContext(format!(
                "payment {} has refunded {} out of {}",
                self.payment_id, self.already_refunded, self.amount_paid
            )));
        }
        Ok(())
    }
}

/// Read-only view of a booking, fetched from the booking/payment lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingContext {
    pub booking_id: BookingId,
    pub client_id: ActorId,
    pub coach_id: ActorId,
    pub starts_at: DateTime<Utc>,
    pub payment: PaymentContext,
    pub policy: CancellationPolicy,
}

impl BookingContext {
    /// The balance still refundable for this booking: amount paid minus
    /// external refunds minus what already moved through `ticket_refunded`.
    pub fn max_refundable(&self, ticket_refunded: &Money) -> Result<Money> {
        self.payment.validate()?;
        self.payment
            .amount_paid
            .checked_sub(&self.payment.already_refunded)?
            .checked_sub(ticket_refunded)
    }
}
