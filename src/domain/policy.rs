use crate::domain::money::Money;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One refund band of a cancellation policy: cancelling with at least
/// `hours_before_start` hours of notice refunds `refund_percentage` percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTier {
    pub hours_before_start: u32,
    pub refund_percentage: u8,
    pub description_key: String,
}

impl PolicyTier {
    pub fn new(
        hours_before_start: u32,
        refund_percentage: u8,
        description_key: impl Into<String>,
    ) -> Result<Self> {
        if refund_percentage > 100 {
            return Err(EngineError::InvalidPolicy(format!(
                "refund percentage must be within 0..=100, got {refund_percentage}"
            )));
        }
        Ok(Self {
            hours_before_start,
            refund_percentage,
            description_key: description_key.into(),
        })
    }
}

/// A coach's tiered cancellation policy. Read-only to the engine.
///
/// Below `minimum_notice_hours` of remaining notice, cancellation is blocked
/// entirely. Otherwise tiers are evaluated by descending `hours_before_start`
/// and the first tier whose threshold is met wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub minimum_notice_hours: u32,
    tiers: Vec<PolicyTier>,
}

impl CancellationPolicy {
    pub fn new(minimum_notice_hours: u32, tiers: Vec<PolicyTier>) -> Result<Self> {
        let policy = Self {
            minimum_notice_hours,
            tiers,
        };
        policy.ensure_well_formed()?;
        Ok(policy)
    }

    pub fn tiers(&self) -> &[PolicyTier] {
        &self.tiers
    }

    /// Re-validates tier bounds. Policies arrive from external configuration
    /// (possibly deserialized), so the evaluator checks again instead of
    /// trusting the constructor path.
    fn ensure_well_formed(&self) -> Result<()> {
        for tier in &self.tiers {
            if tier.refund_percentage > 100 {
                return Err(EngineError::InvalidPolicy(format!(
                    "tier {:?} has refund percentage {} outside 0..=100",
                    tier.description_key, tier.refund_percentage
                )));
            }
        }
        Ok(())
    }
}

/// Why an evaluation turned out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundReason {
    MinimumNoticeViolated,
    TierMatched,
    FullRefundFallback,
}

/// Result of evaluating a cancellation against a policy at a point in time.
///
/// Computed fresh on every evaluation and never cached, since `now` is part
/// of the input. `gross_refund + amount_retained` always equals the amount
/// paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub eligible: bool,
    pub reason_code: RefundReason,
    pub refund_percentage: u8,
    pub gross_refund: Money,
    pub amount_retained: Money,
    pub matched_tier_hours_before: Option<u32>,
}

/// Remaining notice in decimal hours; negative once the booking has started.
pub fn remaining_hours(booking_start: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    Decimal::from((booking_start - now).num_seconds()) / dec!(3600)
}

/// Evaluates a cancellation of a booking starting at `booking_start` against
/// `policy`, as seen at `now`. Pure: no clock access, no I/O, safe to call
/// repeatedly and concurrently.
pub fn evaluate(
    booking_start: DateTime<Utc>,
    policy: &CancellationPolicy,
    now: DateTime<Utc>,
    paid: &Money,
) -> Result<RefundOutcome> {
    policy.ensure_well_formed()?;

    let remaining = remaining_hours(booking_start, now);
    if remaining < Decimal::from(policy.minimum_notice_hours) {
        return Ok(RefundOutcome {
            eligible: false,
            reason_code: RefundReason::MinimumNoticeViolated,
            refund_percentage: 0,
            gross_refund: Money::zero(paid.currency().clone()),
            amount_retained: paid.clone(),
            matched_tier_hours_before: None,
        });
    }

    let mut tiers: Vec<&PolicyTier> = policy.tiers().iter().collect();
    tiers.sort_by(|a, b| b.hours_before_start.cmp(&a.hours_before_start));

    // Past the minimum-notice check there is always a defined outcome: if no
    // tier threshold is met, the minimum-notice boundary acts as an implicit
    // full-refund tier.
    let matched = tiers
        .into_iter()
        .find(|tier| remaining >= Decimal::from(tier.hours_before_start));
    let (percentage, reason_code, matched_tier_hours_before) = match matched {
        Some(tier) => (
            tier.refund_percentage,
            RefundReason::TierMatched,
            Some(tier.hours_before_start),
        ),
        None => (100, RefundReason::FullRefundFallback, None),
    };

    let mut gross_refund = paid.percentage(percentage);
    if gross_refund.compare(paid)? == Ordering::Greater {
        gross_refund = paid.clone();
    }
    let amount_retained = paid.checked_sub(&gross_refund)?;

    Ok(RefundOutcome {
        eligible: true,
        reason_code,
        refund_percentage: percentage,
        gross_refund,
        amount_retained,
        matched_tier_hours_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Currency;
    use chrono::TimeZone;

    fn chf(amount: Decimal) -> Money {
        Money::new(amount, Currency::new("CHF").unwrap()).unwrap()
    }

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    #[test]
    fn test_tier_percentage_bounds() {
        assert!(PolicyTier::new(24, 100, "full").is_ok());
        assert!(matches!(
            PolicyTier::new(24, 101, "broken"),
            Err(EngineError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_malformed_policy_is_rejected_not_defaulted() {
        // Simulate a policy that bypassed the constructor (deserialized).
        let policy: CancellationPolicy = serde_json::from_str(
            r#"{"minimum_notice_hours":0,"tiers":[{"hours_before_start":24,"refund_percentage":250,"description_key":"x"}]}"#,
        )
        .unwrap();
        let start = at("2026-03-10T12:00:00Z");
        let result = evaluate(start, &policy, at("2026-03-09T12:00:00Z"), &chf(dec!(100)));
        assert!(matches!(result, Err(EngineError::InvalidPolicy(_))));
    }

    #[test]
    fn test_minimum_notice_blocks_cancellation() {
        let policy = CancellationPolicy::new(12, vec![]).unwrap();
        let start = at("2026-03-10T12:00:00Z");
        // 11 hours of notice left
        let outcome = evaluate(start, &policy, at("2026-03-10T01:00:00Z"), &chf(dec!(80))).unwrap();

        assert!(!outcome.eligible);
        assert_eq!(outcome.reason_code, RefundReason::MinimumNoticeViolated);
        assert_eq!(outcome.refund_percentage, 0);
        assert_eq!(outcome.gross_refund.amount(), dec!(0));
        assert_eq!(outcome.amount_retained.amount(), dec!(80));
    }

    #[test]
    fn test_full_refund_fallback_when_no_tier_matches() {
        let policy =
            CancellationPolicy::new(0, vec![PolicyTier::new(48, 50, "late").unwrap()]).unwrap();
        let start = at("2026-03-10T12:00:00Z");
        // 24 hours of notice: minimum satisfied, the 48h tier does not match
        let outcome =
            evaluate(start, &policy, at("2026-03-09T12:00:00Z"), &chf(dec!(100))).unwrap();
        assert!(outcome.eligible);
        assert_eq!(outcome.reason_code, RefundReason::FullRefundFallback);
        assert_eq!(outcome.refund_percentage, 100);
        assert_eq!(outcome.gross_refund.amount(), dec!(100));
        assert_eq!(outcome.matched_tier_hours_before, None);
    }

    #[test]
    fn test_started_booking_is_never_refundable_with_positive_minimum() {
        let policy = CancellationPolicy::new(1, vec![]).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 13, 0, 0).unwrap();
        let outcome = evaluate(start, &policy, now, &chf(dec!(50))).unwrap();
        assert!(!outcome.eligible);
    }

    #[test]
    fn test_zero_amount_booking_evaluates_to_zero() {
        let policy =
            CancellationPolicy::new(0, vec![PolicyTier::new(0, 100, "any").unwrap()]).unwrap();
        let start = at("2026-03-10T12:00:00Z");
        let outcome = evaluate(start, &policy, at("2026-03-01T12:00:00Z"), &chf(dec!(0))).unwrap();

        assert!(outcome.eligible);
        assert!(outcome.gross_refund.is_zero());
        assert!(outcome.amount_retained.is_zero());
    }
}
