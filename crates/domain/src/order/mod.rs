//! Order aggregate and related types.

mod aggregate;
mod commands;
mod outcome;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use commands::PlaceOrder;
pub use outcome::{OrderOutcome, Transition};
pub use state::OrderStatus;
pub use value_objects::{OrderItem, ProductId};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be at least 1)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for product {product_id}: {price} cents (must not be negative)")]
    InvalidPrice { product_id: ProductId, price: i64 },

    /// The order total does not fit in the money representation.
    #[error("Order total overflows")]
    TotalOverflow,

    /// An explicit status change named a non-terminal target.
    #[error("Invalid target status: {target}")]
    InvalidTargetStatus { target: OrderStatus },
}
