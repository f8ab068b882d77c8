//! Payment gateway trait and implementations.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use domain::{GatewayOutcome, Payment, codes};
use rand::Rng;

use crate::config::GatewayConfig;

/// Decides whether a charge succeeds.
///
/// The payment processor invokes the gateway at most once per payment.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, payment: &Payment) -> GatewayOutcome;
}

/// Gateway that approves each charge with a fixed probability.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            success_rate: config.clamped_success_rate(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(&GatewayConfig::default())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, payment: &Payment) -> GatewayOutcome {
        let approved = rand::rng().random_bool(self.success_rate);
        let transaction_id = codes::transaction_id();
        tracing::debug!(
            payment_id = %payment.id(),
            amount = %payment.amount(),
            approved,
            "simulated charge"
        );
        if approved {
            GatewayOutcome::approved(transaction_id)
        } else {
            GatewayOutcome::declined(transaction_id)
        }
    }
}

/// Gateway with a forced outcome that counts its invocations.
#[derive(Debug, Default)]
pub struct FixedGateway {
    approve: bool,
    calls: AtomicUsize,
}

impl FixedGateway {
    /// A gateway that approves every charge.
    pub fn approving() -> Self {
        Self {
            approve: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// A gateway that declines every charge.
    pub fn declining() -> Self {
        Self {
            approve: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many times `charge` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FixedGateway {
    async fn charge(&self, _payment: &Payment) -> GatewayOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let transaction_id = codes::transaction_id();
        if self.approve {
            GatewayOutcome::approved(transaction_id)
        } else {
            GatewayOutcome::declined(transaction_id)
        }
    }
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for std::sync::Arc<T> {
    async fn charge(&self, payment: &Payment) -> GatewayOutcome {
        (**self).charge(payment).await
    }
}
