//! Order commands.

use common::UserId;

use crate::payment::PaymentMethod;

use super::OrderItem;

/// Request to place a new order for a resolved user.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The internal id of the user placing the order.
    pub user_id: UserId,

    /// Line items, in the order the client listed them.
    pub items: Vec<OrderItem>,

    /// Free-form shipping address.
    pub shipping_address: String,

    /// Payment method chosen at checkout.
    pub payment_method: PaymentMethod,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command.
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address: impl Into<String>,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            user_id,
            items,
            shipping_address: shipping_address.into(),
            payment_method,
        }
    }
}
