//! Collaborator traits and their HTTP, in-process and test implementations.

pub mod gateway;
pub mod identity;
pub mod notifier;
pub mod payment_client;

pub use gateway::{FixedGateway, PaymentGateway, SimulatedGateway};
pub use identity::{
    CustomerDirectory, CustomerProfile, HttpCustomerDirectory, HttpIdentityResolver,
    IdentityResolver, StaticCustomerDirectory, StaticIdentityResolver,
};
pub use notifier::{ChannelNotifier, HttpWebhookNotifier, PaymentNotifier};
pub use payment_client::{
    HttpPaymentClient, LocalPaymentClient, PaymentClient, StubPaymentClient, StubResponse,
};
