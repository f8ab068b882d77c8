//! Outcomes that drive an order out of `Pending`.

use serde::{Deserialize, Serialize};

use crate::payment::PaymentStatus;

use super::OrderStatus;

/// An event that resolves a pending order.
///
/// Every mutation of an order's status after placement is expressed as one
/// of these outcomes, whether it comes from the placement flow, a payment
/// notification or the expiration sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderOutcome {
    /// The payment completed.
    PaymentConfirmed,

    /// The payment failed, was cancelled, or could not be requested.
    PaymentFailed,

    /// The order stayed pending past its deadline.
    Expired,
}

impl OrderOutcome {
    /// Returns the status a pending order moves to for this outcome.
    pub fn target_status(&self) -> OrderStatus {
        match self {
            OrderOutcome::PaymentConfirmed => OrderStatus::Confirmed,
            OrderOutcome::PaymentFailed | OrderOutcome::Expired => OrderStatus::Cancelled,
        }
    }

    /// Maps a reported payment status to an order outcome.
    ///
    /// `Completed` confirms the order, `Failed` and `Cancelled` cancel it, and
    /// every other status carries no transition.
    pub fn from_payment_status(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Completed => Some(OrderOutcome::PaymentConfirmed),
            PaymentStatus::Failed | PaymentStatus::Cancelled => Some(OrderOutcome::PaymentFailed),
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Refunded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOutcome::PaymentConfirmed => "PAYMENT_CONFIRMED",
            OrderOutcome::PaymentFailed => "PAYMENT_FAILED",
            OrderOutcome::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of applying a status change to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order moved from one status to another.
    Applied { from: OrderStatus, to: OrderStatus },

    /// The order was already resolved; nothing changed.
    NoOp { current: OrderStatus },
}

impl Transition {
    /// Returns true if the order changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }

    /// Returns the status of the order after the transition attempt.
    pub fn status(&self) -> OrderStatus {
        match self {
            Transition::Applied { to, .. } => *to,
            Transition::NoOp { current } => *current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_status() {
        assert_eq!(
            OrderOutcome::PaymentConfirmed.target_status(),
            OrderStatus::Confirmed
        );
        assert_eq!(
            OrderOutcome::PaymentFailed.target_status(),
            OrderStatus::Cancelled
        );
        assert_eq!(OrderOutcome::Expired.target_status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_from_payment_status() {
        assert_eq!(
            OrderOutcome::from_payment_status(PaymentStatus::Completed),
            Some(OrderOutcome::PaymentConfirmed)
        );
        assert_eq!(
            OrderOutcome::from_payment_status(PaymentStatus::Failed),
            Some(OrderOutcome::PaymentFailed)
        );
        assert_eq!(
            OrderOutcome::from_payment_status(PaymentStatus::Cancelled),
            Some(OrderOutcome::PaymentFailed)
        );
        assert_eq!(OrderOutcome::from_payment_status(PaymentStatus::Pending), None);
        assert_eq!(
            OrderOutcome::from_payment_status(PaymentStatus::Processing),
            None
        );
        assert_eq!(OrderOutcome::from_payment_status(PaymentStatus::Refunded), None);
    }

    #[test]
    fn test_transition_status() {
        let applied = Transition::Applied {
            from: OrderStatus::Pending,
            to: OrderStatus::Confirmed,
        };
        assert!(applied.is_applied());
        assert_eq!(applied.status(), OrderStatus::Confirmed);

        let noop = Transition::NoOp {
            current: OrderStatus::Cancelled,
        };
        assert!(!noop.is_applied());
        assert_eq!(noop.status(), OrderStatus::Cancelled);
    }
}
