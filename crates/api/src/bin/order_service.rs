//! Order service entry point.

use std::sync::Arc;

use api::config::{Config, ORDER_SERVICE_PORT};
use api::telemetry;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env(ORDER_SERVICE_PORT);
    telemetry::init_tracing(&config.log_level);

    // 2. Install Prometheus metrics recorder
    let metrics_handle =
        telemetry::install_metrics().expect("failed to install Prometheus recorder");

    // 3. Open storage and build application state
    let store = api::order_store(&config)
        .await
        .expect("failed to open order store");
    let (state, sweeper) =
        api::build_order_state(&config, store).expect("failed to build order service");

    // 4. Start the expiration sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = Arc::new(sweeper).spawn(shutdown_rx);

    // 5. Build the application
    let app = api::create_order_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(
        %addr,
        payment_service = %config.payment_service_url,
        order_timeout = ?config.order_timeout,
        "starting order service"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop the sweeper
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "expiration sweeper task failed");
    }

    tracing::info!("order service shut down gracefully");
}
