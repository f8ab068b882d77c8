//! Configuration structs passed to the saga components at construction.
//!
//! Every field has a default so tests and local runs can use
//! `Default::default()`; the binaries build these from the environment.

use std::time::Duration;

/// How long an order may stay `PENDING` before the sweeper cancels it.
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Shortest period the sweeper runs at; `tokio::time::interval` rejects zero.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for order placement.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on the synchronous create-payment call, and separately on
    /// the void call that compensates it.
    pub payment_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            payment_timeout: Duration::from_secs(5),
        }
    }
}

/// Settings for the expiration sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between two sweeps.
    pub interval: Duration,

    /// Maximum number of expired orders cancelled concurrently within one sweep.
    pub concurrency: usize,
}

impl SweeperConfig {
    /// Returns the interval, raised to [`MIN_SWEEP_INTERVAL`] if shorter.
    pub fn period(&self) -> Duration {
        self.interval.max(MIN_SWEEP_INTERVAL)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            concurrency: 8,
        }
    }
}

/// Settings for the simulated payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Probability that a charge succeeds, in `[0, 1]`.
    pub success_rate: f64,
}

impl GatewayConfig {
    /// Returns the success rate clamped to `[0, 1]`; NaN counts as 0.
    pub fn clamped_success_rate(&self) -> f64 {
        if self.success_rate.is_nan() {
            0.0
        } else {
            self.success_rate.clamp(0.0, 1.0)
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { success_rate: 0.9 }
    }
}

/// Settings for delivering payment outcomes to the order service.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Full URL of the payment-status webhook.
    pub webhook_url: String,

    /// Total delivery attempts per notification, including the first.
    pub max_attempts: u32,

    /// Pause between two attempts.
    pub retry_delay: Duration,

    /// Per-attempt request timeout.
    pub request_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: "http://localhost:8083/api/webhooks/payment-status".to_string(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(3),
        }
    }
}

/// Settings for the create-payment RPC client.
#[derive(Debug, Clone)]
pub struct PaymentClientConfig {
    /// Base URL of the payment service.
    pub base_url: String,

    /// Request timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl Default for PaymentClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8085".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Base URLs of the identity and user-profile collaborators.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub auth_url: String,
    pub user_url: String,
    pub timeout: Duration,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            auth_url: "http://localhost:8084".to_string(),
            user_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}
