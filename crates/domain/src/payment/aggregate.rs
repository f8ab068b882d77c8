//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::codes;

use super::{PaymentError, PaymentMethod, PaymentStatus};

/// Message recorded for an approved charge.
pub const APPROVED_MESSAGE: &str = "Payment processed successfully";

/// Message recorded for a declined charge.
pub const DECLINED_MESSAGE: &str = "Payment failed - insufficient funds";

/// Request to create a payment for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// Decision returned by a payment gateway for one charge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOutcome {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
}

impl GatewayOutcome {
    /// An approved charge with the standard message.
    pub fn approved(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: transaction_id.into(),
            message: APPROVED_MESSAGE.to_string(),
        }
    }

    /// A declined charge with the standard message.
    pub fn declined(transaction_id: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: transaction_id.into(),
            message: DECLINED_MESSAGE.to_string(),
        }
    }
}

/// A validated payment that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    reference: String,
    order_id: OrderId,
    user_id: UserId,
    amount: Money,
    method: PaymentMethod,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl NewPayment {
    /// Validates the request and allocates a candidate reference.
    pub fn create(request: CreatePayment, now: DateTime<Utc>) -> Result<Self, PaymentError> {
        if request.amount.is_negative() {
            return Err(PaymentError::InvalidAmount {
                amount: request.amount.cents(),
            });
        }
        Ok(Self {
            reference: codes::payment_reference(),
            order_id: request.order_id,
            user_id: request.user_id,
            amount: request.amount,
            method: request.method,
            status: PaymentStatus::Pending,
            created_at: now,
        })
    }

    /// Marks the draft as stored `Cancelled`, so it can never be charged.
    pub fn void(&mut self) {
        self.status = PaymentStatus::Cancelled;
    }

    /// Replaces the reference with a fresh candidate after a collision.
    pub fn rereference(&mut self) {
        self.reference = codes::payment_reference();
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Turns the draft into a stored payment with the given id.
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            version: Version::first(),
            reference: self.reference,
            order_id: self.order_id,
            user_id: self.user_id,
            amount: self.amount,
            method: self.method,
            status: self.status,
            transaction_id: None,
            gateway_response: None,
            created_at: self.created_at,
            processed_at: None,
        }
    }
}

/// Payment aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    version: Version,

    /// Unique payment reference.
    reference: String,

    /// The order being paid for.
    order_id: OrderId,
    user_id: UserId,

    /// Equal to the order total at creation time.
    amount: Money,
    method: PaymentMethod,
    status: PaymentStatus,

    /// Set once the gateway has been invoked.
    transaction_id: Option<String>,

    /// Gateway message for the recorded outcome.
    gateway_response: Option<String>,

    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

// Query methods
impl Payment {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn gateway_response(&self) -> Option<&str> {
        self.gateway_response.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// State transitions
impl Payment {
    /// Claims the payment for a gateway call: `Pending → Processing`.
    pub fn begin_processing(&mut self) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(PaymentStatus::Processing) {
            return Err(PaymentError::InvalidStateTransition {
                current: self.status,
                action: "process",
            });
        }
        self.status = PaymentStatus::Processing;
        Ok(())
    }

    /// Records the gateway decision: `Processing → Completed | Failed`.
    pub fn record_outcome(
        &mut self,
        outcome: GatewayOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_record_outcome() {
            return Err(PaymentError::InvalidStateTransition {
                current: self.status,
                action: "record outcome",
            });
        }
        self.status = if outcome.success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        self.transaction_id = Some(outcome.transaction_id);
        self.gateway_response = Some(outcome.message);
        self.processed_at = Some(now);
        Ok(())
    }

    /// Administrative override of the status.
    ///
    /// Setting the current status again is a no-op. Otherwise the target
    /// must be an administrative status the transition table allows from
    /// the current one, so a payment never returns to `Pending` or
    /// `Processing` and is never charged twice. Moving to `Completed` or
    /// `Failed` stamps the processed-at time. Returns the previous status.
    pub fn set_status(
        &mut self,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, PaymentError> {
        let previous = self.status;
        if status == previous {
            return Ok(previous);
        }
        if !status.is_admin_target() || !previous.can_transition_to(status) {
            return Err(PaymentError::StatusChangeNotAllowed {
                current: previous,
                requested: status,
            });
        }
        self.status = status;
        if status.stamps_processed_at() {
            self.processed_at = Some(now);
        }
        Ok(previous)
    }

    /// Sets the version after a successful store write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}
