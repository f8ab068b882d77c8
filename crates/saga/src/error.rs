//! Saga error types.

use common::{OrderId, PaymentId};
use domain::{DomainError, OrderError, ParseEnumError, PaymentError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No order carries the given order number.
    #[error("Order not found: {0}")]
    OrderNumberNotFound(String),

    /// Payment not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// No payment exists for the order.
    #[error("No payment for order {0}")]
    NoPaymentForOrder(OrderId),

    /// A collaborator could not be reached or timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The payment service refused the request.
    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    /// The caller could not be identified.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// A client could not be built from its configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SagaError {
    /// Returns true for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SagaError::Validation(_) | SagaError::Domain(_))
    }
}

impl From<OrderError> for SagaError {
    fn from(e: OrderError) -> Self {
        SagaError::Domain(e.into())
    }
}

impl From<PaymentError> for SagaError {
    fn from(e: PaymentError) -> Self {
        SagaError::Domain(e.into())
    }
}

impl From<ParseEnumError> for SagaError {
    fn from(e: ParseEnumError) -> Self {
        SagaError::Domain(e.into())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
