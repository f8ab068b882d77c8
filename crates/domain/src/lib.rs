//! Domain layer for the order placement saga.
//!
//! This crate provides the pure, storage-agnostic pieces of the system:
//! - Order aggregate with its `PENDING → {CONFIRMED | CANCELLED}` state machine
//! - Payment aggregate with its `PENDING → PROCESSING → {COMPLETED | FAILED}` state machine
//! - Value objects (line items, payment methods) and reference code generation
//!
//! Nothing here performs I/O. Persistence lives in the `store` crate and the
//! orchestration that drives these state machines lives in the `saga` crate.

pub mod codes;
pub mod error;
pub mod order;
pub mod payment;

pub use common::{Money, OrderId, PaymentId, UserId, Version};
pub use error::{DomainError, ParseEnumError};
pub use order::{
    NewOrder, Order, OrderError, OrderItem, OrderOutcome, OrderStatus, PlaceOrder, ProductId,
    Transition,
};
pub use payment::{
    CreatePayment, GatewayOutcome, NewPayment, Payment, PaymentError, PaymentMethod,
    PaymentStatus,
};
