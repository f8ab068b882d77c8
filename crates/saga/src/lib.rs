//! Order placement saga.
//!
//! This crate drives an order from placement to a definite outcome across a
//! process boundary:
//! 1. Place the order `PENDING` with a deadline
//! 2. Synchronously ask the payment service to create a payment (bounded timeout)
//! 3. Receive the charge outcome later as a webhook notification
//! 4. Cancel orders whose outcome never arrived, from a background sweeper
//!
//! If step 2 fails the order is compensated (cancelled) immediately. Every
//! status change, whatever its source, goes through [`OrderService::advance`],
//! which is idempotent and safe under concurrent callers.

pub mod config;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod order_service;
pub mod payment_processor;
pub mod services;
pub mod sweeper;

pub use config::{
    CollaboratorConfig, DEFAULT_ORDER_TIMEOUT, GatewayConfig, MIN_SWEEP_INTERVAL, NotifierConfig,
    OrchestratorConfig, PaymentClientConfig, SweeperConfig,
};
pub use error::{Result, SagaError};
pub use messages::{CreatePaymentRequest, PaymentAck, PaymentNotification};
pub use orchestrator::{
    NotificationOutcome, OrderOrchestrator, OrderReceipt, PlaceOrderRequest, UNKNOWN_CUSTOMER,
};
pub use order_service::OrderService;
pub use payment_processor::PaymentProcessor;
pub use services::{
    ChannelNotifier, CustomerDirectory, CustomerProfile, FixedGateway, HttpCustomerDirectory,
    HttpIdentityResolver, HttpPaymentClient, HttpWebhookNotifier, IdentityResolver,
    LocalPaymentClient, PaymentClient, PaymentGateway, PaymentNotifier, SimulatedGateway,
    StaticCustomerDirectory, StaticIdentityResolver, StubPaymentClient, StubResponse,
};
pub use sweeper::{ExpirationSweeper, SweepReport};
