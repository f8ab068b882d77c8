//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::{
    CollaboratorConfig, DEFAULT_ORDER_TIMEOUT, GatewayConfig, NotifierConfig, OrchestratorConfig, PaymentClientConfig,
    SweeperConfig,
};

/// Default listen port of the order service.
pub const ORDER_SERVICE_PORT: u16 = 8083;

/// Default listen port of the payment service.
pub const PAYMENT_SERVICE_PORT: u16 = 8085;

/// Path on the order service that receives payment outcomes.
pub const PAYMENT_WEBHOOK_PATH: &str = "/api/webhooks/payment-status";

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: 8083 for orders, 8085 for payments)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; in-memory storage when unset
/// - `ORDER_TIMEOUT_SECS` — how long an order may stay pending (default: 600)
/// - `SWEEP_INTERVAL_SECS` — expiration sweep period (default: 300; 0 falls back to the default)
/// - `SWEEP_BATCH_CONCURRENCY` — orders expired in parallel per sweep (default: 8)
/// - `GATEWAY_SUCCESS_RATE` — simulated approval probability (default: 0.9)
/// - `PAYMENT_SERVICE_URL` / `PAYMENT_RPC_TIMEOUT_MS` — create-payment call
/// - `ORDER_SERVICE_URL`, `WEBHOOK_MAX_ATTEMPTS`, `WEBHOOK_RETRY_DELAY_MS`,
///   `WEBHOOK_TIMEOUT_MS` — payment outcome delivery
/// - `AUTH_SERVICE_URL` / `USER_SERVICE_URL` — identity and profile lookups
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub order_timeout: Duration,
    pub sweep_interval: Duration,
    pub sweep_concurrency: usize,
    pub gateway_success_rate: f64,
    pub payment_service_url: String,
    pub payment_rpc_timeout: Duration,
    pub order_service_url: String,
    pub webhook_max_attempts: u32,
    pub webhook_retry_delay: Duration,
    pub webhook_timeout: Duration,
    pub auth_service_url: String,
    pub user_service_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(default_port: u16) -> Self {
        Self::from_lookup(default_port, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_port(default_port);
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        Self {
            host: string("HOST", defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            order_timeout: parse_var(&lookup, "ORDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.order_timeout),
            sweep_interval: parse_var(&lookup, "SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sweep_concurrency: parse_var(&lookup, "SWEEP_BATCH_CONCURRENCY")
                .unwrap_or(defaults.sweep_concurrency),
            gateway_success_rate: parse_var(&lookup, "GATEWAY_SUCCESS_RATE")
                .unwrap_or(defaults.gateway_success_rate),
            payment_service_url: string("PAYMENT_SERVICE_URL", defaults.payment_service_url),
            payment_rpc_timeout: parse_var(&lookup, "PAYMENT_RPC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.payment_rpc_timeout),
            order_service_url: string("ORDER_SERVICE_URL", defaults.order_service_url),
            webhook_max_attempts: parse_var(&lookup, "WEBHOOK_MAX_ATTEMPTS")
                .unwrap_or(defaults.webhook_max_attempts),
            webhook_retry_delay: parse_var(&lookup, "WEBHOOK_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.webhook_retry_delay),
            webhook_timeout: parse_var(&lookup, "WEBHOOK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.webhook_timeout),
            auth_service_url: string("AUTH_SERVICE_URL", defaults.auth_service_url),
            user_service_url: string("USER_SERVICE_URL", defaults.user_service_url),
        }
    }

    /// Returns the defaults with the given listen port.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            payment_timeout: self.payment_rpc_timeout,
        }
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            interval: self.sweep_interval,
            concurrency: self.sweep_concurrency,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            success_rate: self.gateway_success_rate,
        }
    }

    pub fn payment_client(&self) -> PaymentClientConfig {
        PaymentClientConfig {
            base_url: self.payment_service_url.clone(),
            timeout: self.payment_rpc_timeout,
        }
    }

    /// Webhook delivery settings; the URL points at the order service.
    pub fn notifier(&self) -> NotifierConfig {
        NotifierConfig {
            webhook_url: format!(
                "{}{PAYMENT_WEBHOOK_PATH}",
                self.order_service_url.trim_end_matches('/')
            ),
            max_attempts: self.webhook_max_attempts,
            retry_delay: self.webhook_retry_delay,
            request_timeout: self.webhook_timeout,
        }
    }

    pub fn collaborators(&self) -> CollaboratorConfig {
        CollaboratorConfig {
            auth_url: self.auth_service_url.clone(),
            user_url: self.user_service_url.clone(),
            ..CollaboratorConfig::default()
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        let sweeper = SweeperConfig::default();
        let notifier = NotifierConfig::default();
        let collaborators = CollaboratorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: ORDER_SERVICE_PORT,
            log_level: "info".to_string(),
            database_url: None,
            order_timeout: DEFAULT_ORDER_TIMEOUT,
            sweep_interval: sweeper.interval,
            sweep_concurrency: sweeper.concurrency,
            gateway_success_rate: GatewayConfig::default().success_rate,
            payment_service_url: PaymentClientConfig::default().base_url,
            payment_rpc_timeout: orchestrator.payment_timeout,
            order_service_url: format!("http://localhost:{ORDER_SERVICE_PORT}"),
            webhook_max_attempts: notifier.max_attempts,
            webhook_retry_delay: notifier.retry_delay,
            webhook_timeout: notifier.request_timeout,
            auth_service_url: collaborators.auth_url,
            user_service_url: collaborators.user_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(PAYMENT_SERVICE_PORT, lookup(&[]));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8085);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_url, None);
        assert_eq!(config.order_timeout, Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.sweep_concurrency, 8);
        assert_eq!(config.gateway_success_rate, 0.9);
        assert_eq!(config.payment_service_url, "http://localhost:8085");
        assert_eq!(config.payment_rpc_timeout, Duration::from_millis(5000));
        assert_eq!(config.webhook_max_attempts, 3);
        assert_eq!(config.auth_service_url, "http://localhost:8084");
        assert_eq!(config.user_service_url, "http://localhost:8081");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(
            ORDER_SERVICE_PORT,
            lookup(&[
                ("PORT", "9000"),
                ("ORDER_TIMEOUT_SECS", "60"),
                ("SWEEP_INTERVAL_SECS", "5"),
                ("GATEWAY_SUCCESS_RATE", "0.25"),
                ("PAYMENT_RPC_TIMEOUT_MS", "250"),
                ("DATABASE_URL", "postgres://localhost/orders"),
            ]),
        );
        assert_eq!(config.port, 9000);
        assert_eq!(config.order_timeout, Duration::from_secs(60));
        assert_eq!(config.orchestrator().payment_timeout, Duration::from_millis(250));
        assert_eq!(config.sweeper().interval, Duration::from_secs(5));
        assert_eq!(config.gateway().success_rate, 0.25);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = Config::from_lookup(
            ORDER_SERVICE_PORT,
            lookup(&[
                ("PORT", "eighty"),
                ("SWEEP_BATCH_CONCURRENCY", "-1"),
                ("DATABASE_URL", ""),
            ]),
        );
        assert_eq!(config.port, 8083);
        assert_eq!(config.sweep_concurrency, 8);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_zero_sweep_interval_falls_back() {
        let config = Config::from_lookup(
            ORDER_SERVICE_PORT,
            lookup(&[("SWEEP_INTERVAL_SECS", "0")]),
        );
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert!(!config.sweeper().period().is_zero());
    }

    #[test]
    fn test_webhook_url_points_at_order_service() {
        let config = Config::from_lookup(
            PAYMENT_SERVICE_PORT,
            lookup(&[("ORDER_SERVICE_URL", "http://orders:8083/")]),
        );
        assert_eq!(
            config.notifier().webhook_url,
            "http://orders:8083/api/webhooks/payment-status"
        );
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
