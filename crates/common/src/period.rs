//! Rental date ranges.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format for rental dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors produced while building a [`RentalPeriod`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// The date string is not a `YYYY-MM-DD` calendar date.
    #[error("invalid {field} '{value}': expected a YYYY-MM-DD calendar date")]
    InvalidDate { field: &'static str, value: String },

    /// `from_date` is not strictly before `to_date`.
    #[error("from_date {from} must be strictly before to_date {to}")]
    NotOrdered { from: NaiveDate, to: NaiveDate },
}

impl PeriodError {
    /// Returns the name of the offending input field.
    pub fn field(&self) -> &'static str {
        match self {
            PeriodError::InvalidDate { field, .. } => field,
            PeriodError::NotOrdered { .. } => "to_date",
        }
    }
}

/// A half-open range of calendar days `[from, to)`.
///
/// The car is picked up on `from` and returned on `to`, so two rentals where
/// one ends on the day the next begins do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RentalPeriod {
    from: NaiveDate,
    to: NaiveDate,
}

impl RentalPeriod {
    /// Creates a period, rejecting empty or inverted ranges.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, PeriodError> {
        if from >= to {
            return Err(PeriodError::NotOrdered { from, to });
        }
        Ok(Self { from, to })
    }

    /// Parses a period from two `YYYY-MM-DD` strings.
    pub fn parse(from: &str, to: &str) -> Result<Self, PeriodError> {
        let from = parse_date("from_date", from)?;
        let to = parse_date("to_date", to)?;
        Self::new(from, to)
    }

    /// First day of the rental (inclusive).
    pub fn from(&self) -> NaiveDate {
        self.from
    }

    /// Return day (exclusive).
    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Number of billable days.
    ///
    /// Both ends are whole calendar days, so the ceiling of the duration is the
    /// plain day difference; it is always at least 1.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Half-open overlap test: `[a, b)` and `[c, d)` intersect iff `a < d && c < b`.
    pub fn overlaps(&self, other: &RentalPeriod) -> bool {
        self.from < other.to && other.from < self.to
    }
}

impl std::fmt::Display for RentalPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}..{}",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }
}

/// Parses a strict `YYYY-MM-DD` date.
///
/// chrono alone accepts unpadded fields such as `2025-1-5`, so the shape is
/// checked before parsing.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, PeriodError> {
    let invalid = || PeriodError::InvalidDate {
        field,
        value: value.to_string(),
    };

    let well_formed = value.len() == 10
        && value.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(from: &str, to: &str) -> RentalPeriod {
        RentalPeriod::parse(from, to).unwrap()
    }

    #[test]
    fn parse_valid_period() {
        let p = period("2025-01-10", "2025-01-15");
        assert_eq!(p.days(), 5);
        assert_eq!(p.to_string(), "2025-01-10..2025-01-15");
    }

    #[test]
    fn rejects_unpadded_and_garbage_dates() {
        for bad in ["2025-1-10", "2025/01/10", "10-01-2025", "", "2025-01-1a"] {
            let err = RentalPeriod::parse(bad, "2025-02-01").unwrap_err();
            assert_eq!(err.field(), "from_date", "input {bad:?}");
        }
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        let err = RentalPeriod::parse("2025-01-10", "2025-02-30").unwrap_err();
        assert!(matches!(err, PeriodError::InvalidDate { field: "to_date", .. }));
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(matches!(
            RentalPeriod::parse("2025-01-10", "2025-01-10"),
            Err(PeriodError::NotOrdered { .. })
        ));
        assert!(matches!(
            RentalPeriod::parse("2025-01-11", "2025-01-10"),
            Err(PeriodError::NotOrdered { .. })
        ));
    }

    #[test]
    fn adjacent_periods_do_not_overlap() {
        let a = period("2025-01-10", "2025-01-15");
        let b = period("2025-01-15", "2025-01-20");
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = period("2025-01-10", "2025-01-15");
        let inner = period("2025-01-11", "2025-01-12");
        let straddle = period("2025-01-14", "2025-01-20");
        assert!(a.overlaps(&inner) && inner.overlaps(&a));
        assert!(a.overlaps(&straddle) && straddle.overlaps(&a));
        assert!(a.overlaps(&a));
    }
}
