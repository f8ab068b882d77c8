//! Order aggregate implementation.

use chrono::{DateTime, TimeDelta, Utc};
use common::{Money, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::codes;
use crate::payment::PaymentMethod;

use super::{
    OrderError, OrderItem, OrderOutcome, OrderStatus, PlaceOrder, Transition,
    value_objects::total_of,
};

/// A validated order that has not been stored yet.
///
/// Produced by [`NewOrder::place`]; the store assigns the id and turns it into
/// an [`Order`] at version 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    order_number: String,
    user_id: UserId,
    items: Vec<OrderItem>,
    total_amount: Money,
    shipping_address: String,
    payment_method: PaymentMethod,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl NewOrder {
    /// Validates the command, computes the total and sets the deadline.
    ///
    /// The order number is a fresh candidate; the store rejects it with a
    /// duplicate-key error if it collides, in which case the caller should
    /// [`renumber`](Self::renumber) and retry.
    pub fn place(cmd: PlaceOrder, now: DateTime<Utc>, timeout: TimeDelta) -> Result<Self, OrderError> {
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &cmd.items {
            item.validate()?;
        }
        let total_amount = total_of(&cmd.items)?;

        Ok(Self {
            order_number: codes::order_number(),
            user_id: cmd.user_id,
            items: cmd.items,
            total_amount,
            shipping_address: cmd.shipping_address,
            payment_method: cmd.payment_method,
            created_at: now,
            expires_at: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }

    /// Replaces the order number with a fresh candidate.
    pub fn renumber(&mut self) {
        self.order_number = codes::order_number();
    }

    /// Turns the draft into a stored order with the given id.
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            version: Version::first(),
            order_number: self.order_number,
            user_id: self.user_id,
            items: self.items,
            total_amount: self.total_amount,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            status: OrderStatus::Pending,
            created_at: self.created_at,
            updated_at: self.created_at,
            expires_at: Some(self.expires_at),
        }
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Order aggregate root.
///
/// An order is created `Pending` with a deadline and is resolved exactly once,
/// to `Confirmed` or `Cancelled`. The total is fixed at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned identifier.
    id: OrderId,

    /// Current version for optimistic concurrency.
    version: Version,

    /// Unique human-readable order number.
    order_number: String,

    /// User who placed the order.
    user_id: UserId,

    /// Ordered line items.
    items: Vec<OrderItem>,

    /// Sum of all line subtotals.
    total_amount: Money,

    shipping_address: String,
    payment_method: PaymentMethod,

    /// Current status of the order.
    status: OrderStatus,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Deadline for a payment outcome; present only while pending.
    expires_at: Option<DateTime<Utc>>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the line items in placement order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the order is still pending and its deadline is before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.expires_at.is_some_and(|deadline| deadline < now)
    }
}

// State transitions
impl Order {
    /// Applies an outcome to the order.
    ///
    /// A pending order moves to the outcome's target status and its deadline
    /// is cleared. A resolved order is left untouched and a no-op is reported.
    pub fn advance(&mut self, outcome: OrderOutcome, now: DateTime<Utc>) -> Transition {
        self.apply_status(outcome.target_status(), now)
    }

    /// Moves the order to an explicit terminal status.
    ///
    /// Used by administrative updates. `Pending` is never a valid target; any
    /// other target follows the same rules as [`advance`](Self::advance).
    pub fn transition_to(
        &mut self,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        if !target.is_terminal() {
            return Err(OrderError::InvalidTargetStatus { target });
        }
        Ok(self.apply_status(target, now))
    }

    /// Sets the version after a successful store write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply_status(&mut self, target: OrderStatus, now: DateTime<Utc>) -> Transition {
        if !self.status.can_advance() {
            return Transition::NoOp {
                current: self.status,
            };
        }
        let from = self.status;
        self.status = target;
        self.updated_at = now;
        self.expires_at = None;
        Transition::Applied { from, to: target }
    }
}
