//! Payment service entry point.

use api::config::{Config, PAYMENT_SERVICE_PORT};
use api::telemetry;

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env(PAYMENT_SERVICE_PORT);
    telemetry::init_tracing(&config.log_level);

    // 2. Install Prometheus metrics recorder
    let metrics_handle =
        telemetry::install_metrics().expect("failed to install Prometheus recorder");

    // 3. Open storage and build application state
    let store = api::payment_store(&config)
        .await
        .expect("failed to open payment store");
    let state =
        api::build_payment_state(&config, store).expect("failed to build payment service");

    // 4. Build the application
    let app = api::create_payment_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        webhook_url = %config.notifier().webhook_url,
        success_rate = config.gateway().clamped_success_rate(),
        "starting payment service"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("payment service shut down gracefully");
}
