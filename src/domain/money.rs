use crate::error::{EngineError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Minor-unit precision for the currencies in scope (CHF, EUR, ...).
pub const MINOR_UNIT_SCALE: u32 = 2;

/// ISO-4217 style three-letter currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(EngineError::Validation(format!(
                "invalid currency code: {code:?}"
            )))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A non-negative monetary value paired with its currency.
///
/// All monetary fields of the engine travel as `Money`; arithmetic across
/// different currencies is rejected instead of coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "monetary amount must not be negative, got {amount}"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(EngineError::CurrencyMismatch {
                expected: self.currency.code().to_owned(),
                actual: other.currency.code().to_owned(),
            })
        }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        Ok(Self {
            amount: self.amount + other.amount,
            currency: self.currency.clone(),
        })
    }

    /// Subtraction that refuses to go below zero.
    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        if other.amount > self.amount {
            return Err(EngineError::Validation(format!(
                "cannot subtract {other} from {self}"
            )));
        }
        Ok(Self {
            amount: self.amount - other.amount,
            currency: self.currency.clone(),
        })
    }

    pub fn compare(&self, other: &Money) -> Result<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Share of this amount at `percentage`, rounded to the minor unit.
    /// Midpoints round away from zero.
    pub fn percentage(&self, percentage: u8) -> Money {
        let gross = self.amount * Decimal::from(percentage) / dec!(100);
        Self {
            amount: gross
                .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut amount = self.amount;
        if amount.scale() < MINOR_UNIT_SCALE {
            amount.rescale(MINOR_UNIT_SCALE);
        }
        write!(f, "{} {}", amount, self.currency)
    }
}
