//! Order status labels and the status state machine.

use common::{Order, OrderStatus};

use crate::{RentalError, Result};

/// Default labels, in lifecycle order.
pub const DEFAULT_STATUS_LABELS: [&str; 5] = ["NEW", "CONFIRMED", "ACTIVE", "COMPLETED", "CANCELLED"];

/// Caller-facing names of the order statuses.
///
/// The set is closed: exactly one label per [`OrderStatus`], chosen at
/// startup. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLabels {
    labels: [String; 5],
}

impl StatusLabels {
    /// Parses a comma-separated list of five labels in lifecycle order
    /// (new, confirmed, active, completed, cancelled).
    pub fn parse(list: &str) -> Result<Self> {
        let parts: Vec<String> = list.split(',').map(|s| s.trim().to_string()).collect();
        let labels: [String; 5] = parts.try_into().map_err(|parts: Vec<String>| {
            RentalError::validation(
                "status_labels",
                format!("expected 5 labels, got {}", parts.len()),
            )
        })?;

        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(RentalError::validation(
                    "status_labels",
                    "labels must not be empty",
                ));
            }
            if labels[..i].iter().any(|l| l.eq_ignore_ascii_case(label)) {
                return Err(RentalError::validation(
                    "status_labels",
                    format!("duplicate label '{label}'"),
                ));
            }
        }
        Ok(Self { labels })
    }

    /// Returns the label of a status.
    pub fn label(&self, status: OrderStatus) -> &str {
        &self.labels[index(status)]
    }

    /// Looks up the status named by `label`.
    pub fn status(&self, label: &str) -> Option<OrderStatus> {
        let label = label.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|s| self.label(*s).eq_ignore_ascii_case(label))
    }
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            labels: DEFAULT_STATUS_LABELS.map(str::to_string),
        }
    }
}

fn index(status: OrderStatus) -> usize {
    match status {
        OrderStatus::New => 0,
        OrderStatus::Confirmed => 1,
        OrderStatus::Active => 2,
        OrderStatus::Completed => 3,
        OrderStatus::Cancelled => 4,
    }
}

/// The order lifecycle.
///
/// ```text
/// NEW ──► CONFIRMED ──► ACTIVE ──► COMPLETED
///  │          │
///  └──────────┴──► CANCELLED
/// ```
#[derive(Debug, Clone, Default)]
pub struct StatusMachine {
    labels: StatusLabels,
}

impl StatusMachine {
    /// Creates a state machine speaking the given labels.
    pub fn new(labels: StatusLabels) -> Self {
        Self { labels }
    }

    /// Returns the configured labels.
    pub fn labels(&self) -> &StatusLabels {
        &self.labels
    }

    /// Returns true if `from -> to` is a permitted move.
    pub fn is_permitted(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (New, Confirmed) | (Confirmed, Active) | (Active, Completed) | (New, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    /// Parses a status label, failing with `UnknownStatus`.
    pub fn parse(&self, label: &str) -> Result<OrderStatus> {
        self.labels
            .status(label)
            .ok_or_else(|| RentalError::UnknownStatus(label.to_string()))
    }

    /// Returns the label of a status.
    pub fn label(&self, status: OrderStatus) -> &str {
        self.labels.label(status)
    }

    /// Applies a status change to an order.
    ///
    /// Returns the updated order; entering CONFIRMED records the payment.
    /// The input order is left untouched.
    pub fn transition(&self, order: &Order, target: &str) -> Result<Order> {
        let to = self.parse(target)?;
        if !Self::is_permitted(order.status, to) {
            return Err(RentalError::InvalidTransition {
                from: self.label(order.status).to_string(),
                to: self.label(to).to_string(),
            });
        }

        let mut next = order.clone();
        next.status = to;
        if to == OrderStatus::Confirmed {
            next.paid = true;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{CarId, CustomerId, Money, OrderId, RentalPeriod, Version};

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            car_id: CarId::new(),
            period: RentalPeriod::parse("2025-01-10", "2025-01-15").unwrap(),
            status,
            paid: false,
            amount: Money::from_dollars(500),
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_permitted_transitions() {
        let machine = StatusMachine::default();

        let next = machine.transition(&order(OrderStatus::New), "CONFIRMED").unwrap();
        assert_eq!(next.status, OrderStatus::Confirmed);
        assert!(next.paid);

        let next = machine.transition(&order(OrderStatus::Confirmed), "ACTIVE").unwrap();
        assert_eq!(next.status, OrderStatus::Active);

        let next = machine.transition(&order(OrderStatus::Active), "COMPLETED").unwrap();
        assert_eq!(next.status, OrderStatus::Completed);

        for from in [OrderStatus::New, OrderStatus::Confirmed] {
            let next = machine.transition(&order(from), "CANCELLED").unwrap();
            assert_eq!(next.status, OrderStatus::Cancelled);
        }
    }

    #[test]
    fn test_every_unlisted_transition_is_rejected() {
        let machine = StatusMachine::default();
        let permitted = 5;
        let mut allowed = 0;

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let result = machine.transition(&order(from), machine.label(to));
                if StatusMachine::is_permitted(from, to) {
                    allowed += 1;
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                } else {
                    assert!(
                        matches!(result, Err(RentalError::InvalidTransition { .. })),
                        "{from} -> {to} should be rejected"
                    );
                }
            }
        }
        assert_eq!(allowed, permitted);
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        let machine = StatusMachine::default();
        for from in [OrderStatus::Completed, OrderStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in OrderStatus::ALL {
                assert!(!StatusMachine::is_permitted(from, to));
            }
            let err = machine.transition(&order(from), "NEW").unwrap_err();
            assert!(matches!(err, RentalError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_new_to_active_is_invalid() {
        let machine = StatusMachine::default();
        let err = machine.transition(&order(OrderStatus::New), "ACTIVE").unwrap_err();
        assert!(matches!(
            err,
            RentalError::InvalidTransition { ref from, ref to } if from == "NEW" && to == "ACTIVE"
        ));
    }

    #[test]
    fn test_unknown_label() {
        let machine = StatusMachine::default();
        let err = machine.transition(&order(OrderStatus::New), "SHIPPED").unwrap_err();
        assert!(matches!(err, RentalError::UnknownStatus(ref l) if l == "SHIPPED"));
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        let labels = StatusLabels::default();
        assert_eq!(labels.status("confirmed"), Some(OrderStatus::Confirmed));
        assert_eq!(labels.status(" Cancelled "), Some(OrderStatus::Cancelled));
        assert_eq!(labels.status("paid"), None);
    }

    #[test]
    fn test_custom_labels() {
        let labels = StatusLabels::parse("new, paid, in_use, closed, cancelled").unwrap();
        assert_eq!(labels.label(OrderStatus::Confirmed), "paid");
        assert_eq!(labels.status("in_use"), Some(OrderStatus::Active));

        let machine = StatusMachine::new(labels);
        let next = machine.transition(&order(OrderStatus::New), "paid").unwrap();
        assert_eq!(next.status, OrderStatus::Confirmed);
        assert!(matches!(
            machine.parse("CONFIRMED"),
            Err(RentalError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_invalid_label_lists() {
        assert!(StatusLabels::parse("a,b,c").is_err());
        assert!(StatusLabels::parse("a,b,,d,e").is_err());
        assert!(StatusLabels::parse("a,b,c,d,A").is_err());
        assert!(StatusLabels::parse("a,b,c,d,e,f").is_err());
    }
}
