//! Money amounts.

use serde::{Deserialize, Serialize};

/// An amount of money in whole cents.
///
/// Serialized as a bare integer number of cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Amount of `dollars` with no cents part.
    pub fn from_dollars(dollars: i64) -> Self {
        Self::from_cents(dollars * 100)
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Price of `units` at this rate, or None if it does not fit in i64.
    pub fn checked_multiply(&self, units: i64) -> Option<Money> {
        self.cents.checked_mul(units).map(Money::from_cents)
    }
}

/// Renders as `$D.CC`, with a leading minus for refunds.
impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}
