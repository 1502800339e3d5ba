use crate::domain::ids::PaymentId;
use crate::domain::money::Money;
use crate::domain::ports::{
    DisputeEvent, NotificationEmitter, SettlementGateway, SettlementReceipt, SettlementStatus,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Settlement gateway double backed by an in-process refund ledger.
///
/// Charges are registered up front; a refund that would exceed the remaining
/// charge comes back with a `Failed` receipt, the way a processor rejects an
/// over-refund. Tests can script transport failures via `fail_next_refunds`.
#[derive(Default)]
pub struct InProcessSettlementGateway {
    ledger: RwLock<Ledger>,
    fail_next: AtomicU32,
}

#[derive(Default)]
struct Ledger {
    charges: HashMap<PaymentId, Money>,
    refunded: HashMap<PaymentId, Money>,
    calls: Vec<(PaymentId, Money)>,
}

impl InProcessSettlementGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register_charge(&self, payment_id: PaymentId, amount: Money) {
        let mut ledger = self.ledger.write().await;
        ledger.charges.insert(payment_id, amount);
    }

    /// Makes the next `count` refund calls fail with a transport error.
    pub fn fail_next_refunds(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every refund call seen so far, successful or not.
    pub async fn refund_calls(&self) -> Vec<(PaymentId, Money)> {
        self.ledger.read().await.calls.clone()
    }

    pub async fn total_refunded(&self, payment_id: &PaymentId) -> Option<Money> {
        self.ledger.read().await.refunded.get(payment_id).cloned()
    }
}

#[async_trait]
impl SettlementGateway for InProcessSettlementGateway {
    async fn refund(
        &self,
        payment_id: &PaymentId,
        amount: &Money,
        reason: &str,
    ) -> Result<SettlementReceipt> {
        let mut ledger = self.ledger.write().await;
        ledger.calls.push((payment_id.clone(), amount.clone()));

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::SettlementFailed {
                payment: payment_id.clone(),
                reason: "processor unreachable".to_owned(),
            });
        }

        let Some(charge) = ledger.charges.get(payment_id).cloned() else {
            return Err(EngineError::SettlementFailed {
                payment: payment_id.clone(),
                reason: "unknown payment".to_owned(),
            });
        };
        let refunded = ledger
            .refunded
            .get(payment_id)
            .cloned()
            .unwrap_or_else(|| Money::zero(charge.currency().clone()));
        let outcome_id = format!("stl_{}", Uuid::new_v4().simple());

        let after = refunded.checked_add(amount)?;
        if after.compare(&charge)? == std::cmp::Ordering::Greater {
            tracing::warn!(
                payment = %payment_id,
                %amount,
                %refunded,
                "refund rejected: would exceed the original charge"
            );
            return Ok(SettlementReceipt {
                outcome_id,
                status: SettlementStatus::Failed,
                amount_refunded: Money::zero(charge.currency().clone()),
            });
        }

        ledger.refunded.insert(payment_id.clone(), after);
        tracing::info!(payment = %payment_id, %amount, reason, outcome = %outcome_id, "refund settled");
        Ok(SettlementReceipt {
            outcome_id,
            status: SettlementStatus::Succeeded,
            amount_refunded: amount.clone(),
        })
    }
}

/// Notifier that keeps every event in memory, for tests and the replay run.
#[derive(Default)]
pub struct RecordingNotificationEmitter {
    events: RwLock<Vec<DisputeEvent>>,
}

impl RecordingNotificationEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn events(&self) -> Vec<DisputeEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl NotificationEmitter for RecordingNotificationEmitter {
    async fn notify(&self, event: DisputeEvent) {
        self.events.write().await.push(event);
    }
}

/// Notifier that only logs. Used by the replay binary, where delivery is an
/// external concern.
#[derive(Default, Clone, Copy)]
pub struct TracingNotificationEmitter;

#[async_trait]
impl NotificationEmitter for TracingNotificationEmitter {
    async fn notify(&self, event: DisputeEvent) {
        tracing::info!(?event, "dispute notification");
    }
}
