//! Order placement orchestrator.
//!
//! Drives a new order to a definite status: the order is stored `PENDING`,
//! the payment service is asked for a payment under a bounded timeout, and
//! any failure of that call is compensated before the client sees a
//! response: the order is cancelled and whatever payment the payment service
//! may still have stored for it is voided. The charge outcome arrives later
//! through [`OrderOrchestrator::handle_payment_notification`].

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, UserId};
use domain::{
    Order, OrderItem, OrderOutcome, OrderStatus, PaymentMethod, PaymentStatus, PlaceOrder,
    Transition,
};
use store::OrderStore;

use crate::config::OrchestratorConfig;
use crate::error::{Result, SagaError};
use crate::messages::CreatePaymentRequest;
use crate::order_service::OrderService;
use crate::services::{CustomerDirectory, CustomerProfile, IdentityResolver, PaymentClient};

/// Display name used when the user service has no profile for the customer.
pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

/// Client request to place an order, before the caller is resolved.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderItem>,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

/// Result of a placement: the order in its definite status plus display fields.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order: Order,
    pub customer_name: String,
    pub customer_email: String,
}

/// What an inbound payment notification did to its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The order was pending and is now resolved.
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order was already resolved.
    NoOp { current: OrderStatus },
    /// No order has the notified id.
    UnknownOrder,
    /// The payment status carries no order transition.
    Ignored { status: String },
}

impl NotificationOutcome {
    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Applied { .. } => "applied",
            NotificationOutcome::NoOp { .. } => "noop",
            NotificationOutcome::UnknownOrder => "unknown_order",
            NotificationOutcome::Ignored { .. } => "ignored",
        }
    }
}

impl From<Transition> for NotificationOutcome {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Applied { from, to } => NotificationOutcome::Applied { from, to },
            Transition::NoOp { current } => NotificationOutcome::NoOp { current },
        }
    }
}

/// Orchestrates order placement and payment reconciliation.
pub struct OrderOrchestrator<S: OrderStore> {
    orders: Arc<OrderService<S>>,
    payments: Arc<dyn PaymentClient>,
    identity: Arc<dyn IdentityResolver>,
    customers: Arc<dyn CustomerDirectory>,
    config: OrchestratorConfig,
}

impl<S: OrderStore> OrderOrchestrator<S> {
    pub fn new(
        orders: Arc<OrderService<S>>,
        payments: Arc<dyn PaymentClient>,
        identity: Arc<dyn IdentityResolver>,
        customers: Arc<dyn CustomerDirectory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            identity,
            customers,
            config,
        }
    }

    /// Returns the order service the orchestrator drives.
    pub fn orders(&self) -> &Arc<OrderService<S>> {
        &self.orders
    }

    /// Places an order for the caller identified by `bearer_token`.
    ///
    /// Returns the order `PENDING` when the payment service accepted the
    /// payment request, or `CANCELLED` when the request failed, was refused
    /// or timed out. Only identity, validation and order store failures are
    /// returned as errors; in those cases no payment was requested.
    #[tracing::instrument(skip(self, bearer_token, request))]
    pub async fn place_order(
        &self,
        bearer_token: &str,
        request: PlaceOrderRequest,
    ) -> Result<OrderReceipt> {
        let started = Instant::now();

        let user_id = self.identity.resolve(bearer_token).await?;
        let order = self
            .orders
            .place(PlaceOrder::new(
                user_id,
                request.items,
                request.shipping_address,
                request.payment_method,
            ))
            .await?;
        metrics::counter!("orders_placed_total").increment(1);

        let payment_request = CreatePaymentRequest {
            order_id: order.id(),
            user_id,
            amount: order.total_amount(),
            method: order.payment_method().as_str().to_string(),
        };

        let rpc = tokio::time::timeout(
            self.config.payment_timeout,
            self.payments.create_for_order(payment_request.clone()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(SagaError::UpstreamUnavailable(format!(
                "payment service did not answer within {:?}",
                self.config.payment_timeout
            )))
        });

        let order = match rpc {
            Ok(ack) => {
                tracing::info!(
                    order_id = %order.id(),
                    payment_id = %ack.id,
                    reference = %ack.reference,
                    "payment requested"
                );
                order
            }
            Err(e) => self.compensate(order, payment_request, &e).await,
        };

        let (customer_name, customer_email) = self.customer_fields(user_id, bearer_token).await;

        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(OrderReceipt {
            order,
            customer_name,
            customer_email,
        })
    }

    /// Compensates a failed payment request and returns the order in its
    /// definite status.
    ///
    /// The order is cancelled first, so a late `COMPLETED` notification can
    /// no longer confirm it. A timed out or unanswered request may still
    /// have stored a payment, which is then voided; a rejection stored
    /// nothing. If a notification confirmed the order before the cancel, the
    /// payment went through and is kept. An order that cannot be cancelled
    /// is returned `PENDING` and left to the sweeper.
    async fn compensate(
        &self,
        order: Order,
        request: CreatePaymentRequest,
        cause: &SagaError,
    ) -> Order {
        let order_id = order.id();
        tracing::warn!(%order_id, error = %cause, "payment request failed, cancelling order");

        match self.orders.advance(order_id, OrderOutcome::PaymentFailed).await {
            Ok(Transition::NoOp {
                current: OrderStatus::Confirmed,
            }) => {
                tracing::info!(%order_id, "order already confirmed by its payment, keeping it");
                return self.reload(order).await;
            }
            Ok(transition) => {
                if transition.is_applied() {
                    metrics::counter!("orders_compensated_total").increment(1);
                }
            }
            Err(e) => {
                tracing::error!(%order_id, error = %e, "compensation failed, leaving order to the sweeper");
            }
        }

        if matches!(cause, SagaError::UpstreamUnavailable(_)) {
            self.void_payment(request).await;
        }
        self.reload(order).await
    }

    async fn void_payment(&self, request: CreatePaymentRequest) {
        let order_id = request.order_id;
        let void = tokio::time::timeout(
            self.config.payment_timeout,
            self.payments.void_for_order(request),
        )
        .await;

        match void {
            Ok(Ok(ack)) => {
                tracing::info!(%order_id, payment_id = %ack.id, status = %ack.status, "payment voided");
            }
            Ok(Err(e)) => {
                metrics::counter!("payment_void_failures_total").increment(1);
                tracing::error!(%order_id, error = %e, "payment void failed");
            }
            Err(_) => {
                metrics::counter!("payment_void_failures_total").increment(1);
                tracing::error!(%order_id, "payment void timed out");
            }
        }
    }

    /// Re-reads an order, falling back to the given copy.
    async fn reload(&self, order: Order) -> Order {
        match self.orders.get(order.id()).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "could not reload order");
                order
            }
        }
    }

    async fn customer_fields(&self, user_id: UserId, bearer_token: &str) -> (String, String) {
        let profile = match self.customers.lookup(user_id, bearer_token).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "customer lookup failed");
                None
            }
        };
        match profile {
            Some(CustomerProfile { full_name, email }) => (
                full_name,
                email.unwrap_or_else(|| placeholder_email(user_id)),
            ),
            None => (UNKNOWN_CUSTOMER.to_string(), placeholder_email(user_id)),
        }
    }

    /// Applies a payment outcome delivered by the payment service.
    ///
    /// `COMPLETED` confirms the order; `FAILED` and `CANCELLED` cancel it.
    /// Any other status, a resolved order and an unknown order are reported
    /// through the returned outcome rather than as errors. Only store
    /// failures are returned as errors, so the sender retries.
    #[tracing::instrument(skip(self))]
    pub async fn handle_payment_notification(
        &self,
        order_id: OrderId,
        status: &str,
    ) -> Result<NotificationOutcome> {
        let outcome = status
            .parse::<PaymentStatus>()
            .ok()
            .and_then(OrderOutcome::from_payment_status);

        let result = match outcome {
            None => {
                tracing::info!(%order_id, status, "payment status carries no order transition");
                NotificationOutcome::Ignored {
                    status: status.to_string(),
                }
            }
            Some(outcome) => match self.orders.advance(order_id, outcome).await {
                Ok(transition) => {
                    tracing::info!(
                        %order_id,
                        %outcome,
                        to = %transition.status(),
                        "payment notification applied"
                    );
                    transition.into()
                }
                Err(SagaError::OrderNotFound(_)) => {
                    tracing::warn!(%order_id, "payment notification for unknown order");
                    NotificationOutcome::UnknownOrder
                }
                Err(e) => return Err(e),
            },
        };

        metrics::counter!("payment_notifications_total", "result" => result.as_str()).increment(1);
        Ok(result)
    }
}

fn placeholder_email(user_id: UserId) -> String {
    format!("customer{user_id}@example.com")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Money;
    use store::InMemoryOrderStore;

    use super::*;
    use crate::services::{
        StaticCustomerDirectory, StaticIdentityResolver, StubPaymentClient, StubResponse,
    };

    const TOKEN: &str = "token-1";

    struct Harness {
        orchestrator: OrderOrchestrator<InMemoryOrderStore>,
        payments: Arc<StubPaymentClient>,
    }

    fn harness(response: StubResponse) -> Harness {
        harness_with(response, StaticCustomerDirectory::new())
    }

    fn harness_with(response: StubResponse, customers: StaticCustomerDirectory) -> Harness {
        let payments = Arc::new(StubPaymentClient::new(response));
        let orders = Arc::new(OrderService::new(
            InMemoryOrderStore::new(),
            Duration::from_secs(600),
        ));
        let orchestrator = OrderOrchestrator::new(
            orders,
            payments.clone(),
            Arc::new(StaticIdentityResolver::new().with_token(TOKEN, UserId::new(7))),
            Arc::new(customers),
            OrchestratorConfig {
                payment_timeout: Duration::from_millis(50),
            },
        );
        Harness {
            orchestrator,
            payments,
        }
    }

    fn request() -> PlaceOrderRequest {
        PlaceOrderRequest {
            items: vec![
                OrderItem::new(1, "Widget", 2, Money::from_cents(1000)),
                OrderItem::new(2, "Gadget", 1, Money::from_cents(500)),
            ],
            shipping_address: "1 Main St".to_string(),
            payment_method: PaymentMethod::CreditCard,
        }
    }

    #[tokio::test]
    async fn test_accepted_payment_leaves_order_pending() {
        let h = harness(StubResponse::Accept);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.order.status(), OrderStatus::Pending);
        assert_eq!(receipt.order.total_amount(), Money::from_cents(2500));
        assert_eq!(receipt.order.user_id(), UserId::new(7));
        assert_eq!(h.payments.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_payment_cancels_order() {
        let h = harness(StubResponse::Reject);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.order.status(), OrderStatus::Cancelled);
        assert_eq!(receipt.order.expires_at(), None);
        assert_eq!(h.payments.void_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_payment_service_cancels_order() {
        let h = harness(StubResponse::Unavailable);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();
        assert_eq!(receipt.order.status(), OrderStatus::Cancelled);
        assert_eq!(h.payments.void_count(), 1);
    }

    #[tokio::test]
    async fn test_payment_timeout_cancels_order_and_voids_payment() {
        let h = harness(StubResponse::Hang);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.order.status(), OrderStatus::Cancelled);
        let stored = h.orchestrator.orders().get(receipt.order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
        assert_eq!(h.payments.void_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_compensation_returns_pending_order() {
        let h = harness(StubResponse::Unavailable);
        // The in-memory store assigns ids from 1.
        h.orchestrator
            .orders()
            .store()
            .fail_updates_for(OrderId::new(1))
            .await;

        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.order.id(), OrderId::new(1));
        assert_eq!(receipt.order.status(), OrderStatus::Pending);
        assert!(receipt.order.expires_at().is_some());
        assert_eq!(h.payments.void_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_stores_nothing() {
        let h = harness(StubResponse::Accept);
        let result = h.orchestrator.place_order("nope", request()).await;

        assert!(matches!(result, Err(SagaError::Unauthenticated(_))));
        assert!(h.orchestrator.orders().list_all().await.unwrap().is_empty());
        assert_eq!(h.payments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_order_is_not_sent_for_payment() {
        let h = harness(StubResponse::Accept);
        let mut empty = request();
        empty.items.clear();

        let err = h.orchestrator.place_order(TOKEN, empty).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(h.payments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_customer_fields_from_profile() {
        let customers = StaticCustomerDirectory::new().with_profile(
            UserId::new(7),
            CustomerProfile {
                full_name: "Ada Lovelace".to_string(),
                email: Some("ada@example.org".to_string()),
            },
        );
        let h = harness_with(StubResponse::Accept, customers);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.customer_name, "Ada Lovelace");
        assert_eq!(receipt.customer_email, "ada@example.org");
    }

    #[tokio::test]
    async fn test_customer_fields_fall_back_to_placeholders() {
        let h = harness(StubResponse::Accept);
        let receipt = h.orchestrator.place_order(TOKEN, request()).await.unwrap();

        assert_eq!(receipt.customer_name, UNKNOWN_CUSTOMER);
        assert_eq!(receipt.customer_email, "customer7@example.com");
    }

    #[tokio::test]
    async fn test_notification_statuses() {
        let h = harness(StubResponse::Accept);
        let confirmed = h.orchestrator.place_order(TOKEN, request()).await.unwrap().order;
        let cancelled = h.orchestrator.place_order(TOKEN, request()).await.unwrap().order;
        let untouched = h.orchestrator.place_order(TOKEN, request()).await.unwrap().order;

        let applied = h
            .orchestrator
            .handle_payment_notification(confirmed.id(), "completed")
            .await
            .unwrap();
        assert_eq!(
            applied,
            NotificationOutcome::Applied {
                from: OrderStatus::Pending,
                to: OrderStatus::Confirmed
            }
        );

        let applied = h
            .orchestrator
            .handle_payment_notification(cancelled.id(), "CANCELLED")
            .await
            .unwrap();
        assert_eq!(
            applied,
            NotificationOutcome::Applied {
                from: OrderStatus::Pending,
                to: OrderStatus::Cancelled
            }
        );

        for status in ["PROCESSING", "REFUNDED", "bogus"] {
            let ignored = h
                .orchestrator
                .handle_payment_notification(untouched.id(), status)
                .await
                .unwrap();
            assert_eq!(
                ignored,
                NotificationOutcome::Ignored {
                    status: status.to_string()
                }
            );
        }
        let stored = h.orchestrator.orders().get(untouched.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_and_late_notifications_are_noops() {
        let h = harness(StubResponse::Accept);
        let order = h.orchestrator.place_order(TOKEN, request()).await.unwrap().order;

        h.orchestrator
            .handle_payment_notification(order.id(), "FAILED")
            .await
            .unwrap();
        let late = h
            .orchestrator
            .handle_payment_notification(order.id(), "COMPLETED")
            .await
            .unwrap();

        assert_eq!(
            late,
            NotificationOutcome::NoOp {
                current: OrderStatus::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn test_notification_for_unknown_order() {
        let h = harness(StubResponse::Accept);
        let outcome = h
            .orchestrator
            .handle_payment_notification(OrderId::new(404), "COMPLETED")
            .await
            .unwrap();
        assert_eq!(outcome, NotificationOutcome::UnknownOrder);
    }
}
