//! Payment aggregate and related types.

mod aggregate;
mod method;
mod state;

pub use aggregate::{
    APPROVED_MESSAGE, CreatePayment, DECLINED_MESSAGE, GatewayOutcome, NewPayment, Payment,
};
pub use method::PaymentMethod;
pub use state::PaymentStatus;

use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The amount to charge is negative.
    #[error("Invalid payment amount: {amount} cents (must not be negative)")]
    InvalidAmount { amount: i64 },

    /// Payment is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current} state")]
    InvalidStateTransition {
        current: PaymentStatus,
        action: &'static str,
    },

    /// The requested status cannot follow the current one.
    #[error("Payment status cannot change from {current} to {requested}")]
    StatusChangeNotAllowed {
        current: PaymentStatus,
        requested: PaymentStatus,
    },
}
