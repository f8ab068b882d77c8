//! HTTP surfaces of the order and payment services.
//!
//! Each service is an axum [`Router`] over shared state, with structured
//! logging (tracing), Prometheus metrics and a health endpoint. The binaries
//! in `src/bin` wire the routers to configuration, storage and the HTTP
//! collaborators; tests wire them to in-memory doubles.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    ExpirationSweeper, HttpCustomerDirectory, HttpIdentityResolver, HttpPaymentClient,
    HttpWebhookNotifier, OrderOrchestrator, OrderService, PaymentGateway, PaymentNotifier,
    PaymentProcessor, SagaError, SimulatedGateway,
};
use store::{
    InMemoryOrderStore, InMemoryPaymentStore, OrderStore, PaymentStore, PostgresOrderStore,
    PostgresPaymentStore, StoreError,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::OrderAppState;
use routes::payments::PaymentAppState;

/// Order store selected at start-up.
pub type DynOrderStore = Arc<dyn OrderStore>;

/// Payment store selected at start-up.
pub type DynPaymentStore = Arc<dyn PaymentStore>;

/// Payment processor with its collaborators selected at start-up.
pub type DynPaymentProcessor =
    PaymentProcessor<DynPaymentStore, Arc<dyn PaymentGateway>, Arc<dyn PaymentNotifier>>;

fn with_common_layers(router: Router, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    router
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the order service router.
pub fn create_order_app(state: Arc<OrderAppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::orders;

    let router = Router::new()
        .route("/health", get(routes::health::order_service))
        .route("/api/orders", get(orders::list))
        .route("/api/orders/place", post(orders::place))
        .route("/api/orders/{id}", get(orders::get).delete(orders::delete))
        .route("/api/orders/{id}/status", put(orders::update_status))
        .route("/api/orders/number/{order_number}", get(orders::get_by_number))
        .route("/api/orders/user/{user_id}", get(orders::list_by_user))
        .route("/api/orders/user/{user_id}/count", get(orders::count_by_user))
        .route("/api/orders/status/{status}", get(orders::list_by_status))
        .route(
            config::PAYMENT_WEBHOOK_PATH,
            post(routes::webhooks::payment_status),
        )
        .with_state(state);

    with_common_layers(router, metrics_handle)
}

/// Creates the payment service router.
pub fn create_payment_app(
    state: Arc<PaymentAppState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::payments;

    let router = Router::new()
        .route("/health", get(routes::health::payment_service))
        .route("/api/payments", get(payments::list))
        .route(
            "/api/payments/create-for-order",
            post(payments::create_for_order),
        )
        .route("/api/payments/void-for-order", post(payments::void_for_order))
        .route(
            "/api/payments/{id}",
            get(payments::get).delete(payments::delete),
        )
        .route("/api/payments/{id}/process", post(payments::process))
        .route("/api/payments/{id}/status", put(payments::update_status))
        .route("/api/payments/order/{order_id}", get(payments::get_by_order))
        .route("/api/payments/user/{user_id}", get(payments::list_by_user))
        .route("/api/payments/status/{status}", get(payments::list_by_status))
        .with_state(state);

    with_common_layers(router, metrics_handle)
}

/// Opens the order store: PostgreSQL when `DATABASE_URL` is set, memory otherwise.
pub async fn order_store(config: &Config) -> Result<DynOrderStore, StoreError> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(PostgresOrderStore::new(store::connect(url).await?))),
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

/// Opens the payment store: PostgreSQL when `DATABASE_URL` is set, memory otherwise.
pub async fn payment_store(config: &Config) -> Result<DynPaymentStore, StoreError> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(PostgresPaymentStore::new(
            store::connect(url).await?,
        ))),
        None => {
            tracing::warn!("DATABASE_URL not set, payments are kept in memory");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

/// Builds the order service state and its expiration sweeper over `store`,
/// talking to the payment, auth and user services over HTTP.
pub fn build_order_state(
    config: &Config,
    store: DynOrderStore,
) -> Result<(Arc<OrderAppState>, ExpirationSweeper<DynOrderStore>), SagaError> {
    let collaborators = config.collaborators();
    let orders = Arc::new(OrderService::new(store, config.order_timeout));

    let orchestrator = OrderOrchestrator::new(
        Arc::clone(&orders),
        Arc::new(HttpPaymentClient::new(&config.payment_client())?),
        Arc::new(HttpIdentityResolver::new(&collaborators)?),
        Arc::new(HttpCustomerDirectory::new(&collaborators)?),
        config.orchestrator(),
    );
    let sweeper = ExpirationSweeper::new(orders, config.sweeper());

    Ok((Arc::new(OrderAppState::new(orchestrator)), sweeper))
}

/// Builds the payment service state over `store`, with the simulated
/// gateway and webhook delivery to the order service.
pub fn build_payment_state(
    config: &Config,
    store: DynPaymentStore,
) -> Result<Arc<PaymentAppState>, SagaError> {
    let gateway: Arc<dyn PaymentGateway> = Arc::new(SimulatedGateway::new(&config.gateway()));
    let notifier: Arc<dyn PaymentNotifier> =
        Arc::new(HttpWebhookNotifier::new(config.notifier())?);
    let processor = PaymentProcessor::new(store, gateway, notifier);

    Ok(Arc::new(PaymentAppState::new(Arc::new(processor))))
}
