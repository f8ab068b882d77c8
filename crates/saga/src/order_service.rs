//! Order service: the order state machine over an [`OrderStore`].

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::{OrderId, UserId};
use domain::{NewOrder, Order, OrderOutcome, OrderStatus, PlaceOrder, Transition};
use store::{OrderStore, StoreError};

use crate::error::{Result, SagaError};

/// Attempts at finding an unused order number before giving up.
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Read-modify-write rounds `advance` makes when it keeps losing races.
const MAX_CONFLICT_RETRIES: usize = 5;

/// Service for managing orders.
///
/// All status changes after placement go through [`advance`](Self::advance)
/// (or the administrative [`update_status`](Self::update_status)), which
/// write back with the version they read. Concurrent callers therefore can
/// never both resolve the same order.
pub struct OrderService<S: OrderStore> {
    store: S,
    order_timeout: TimeDelta,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service. Orders expire `order_timeout` after placement.
    pub fn new(store: S, order_timeout: Duration) -> Self {
        Self {
            store,
            order_timeout: TimeDelta::from_std(order_timeout).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates and stores a new `PENDING` order.
    ///
    /// Order number collisions are retried with a fresh number.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id))]
    pub async fn place(&self, cmd: PlaceOrder) -> Result<Order> {
        let mut draft = NewOrder::place(cmd, Utc::now(), self.order_timeout)?;

        let mut attempt = 1;
        loop {
            match self.store.insert(draft.clone()).await {
                Ok(order) => {
                    tracing::info!(
                        order_id = %order.id(),
                        order_number = order.order_number(),
                        total = %order.total_amount(),
                        "order placed"
                    );
                    return Ok(order);
                }
                Err(StoreError::DuplicateKey {
                    field: "order_number",
                    value,
                    ..
                }) if attempt < MAX_ORDER_NUMBER_ATTEMPTS => {
                    tracing::debug!(order_number = %value, attempt, "order number taken, retrying");
                    draft.renumber();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Applies an outcome to an order.
    ///
    /// A pending order moves to the outcome's target status. A resolved
    /// order is left untouched and a [`Transition::NoOp`] is returned; this
    /// is never an error. Losing a write race re-reads the order, which by
    /// then is resolved, so the loser observes a no-op.
    #[tracing::instrument(skip(self, outcome), fields(outcome = %outcome))]
    pub async fn advance(&self, id: OrderId, outcome: OrderOutcome) -> Result<Transition> {
        let mut conflicts = 0;
        loop {
            let mut order = self.get(id).await?;
            let transition = order.advance(outcome, Utc::now());

            let Transition::Applied { from, to } = transition else {
                metrics::counter!("order_transition_noops_total").increment(1);
                tracing::debug!(%id, current = %transition.status(), "order already resolved");
                return Ok(transition);
            };

            match self.store.update(&order).await {
                Ok(_) => {
                    metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
                    tracing::info!(%id, %from, %to, "order transitioned");
                    return Ok(transition);
                }
                Err(e) if e.is_conflict() && conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    tracing::debug!(%id, conflicts, "concurrent update, re-reading order");
                }
                Err(StoreError::NotFound { .. }) => return Err(SagaError::OrderNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Administrative status change.
    ///
    /// Only terminal targets are accepted and a resolved order is a no-op.
    /// Unlike [`advance`](Self::advance) a write race is reported to the
    /// caller as a store conflict.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Transition> {
        let mut order = self.get(id).await?;
        let transition = order.transition_to(status, Utc::now())?;
        if transition.is_applied() {
            self.store.update(&order).await?;
            metrics::counter!("order_transitions_total", "to" => status.as_str()).increment(1);
            tracing::info!(%id, %status, "order status updated by administrator");
        }
        Ok(transition)
    }

    /// Loads an order; `OrderNotFound` if absent.
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.store
            .get(id)
            .await?
            .ok_or(SagaError::OrderNotFound(id))
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> Result<Order> {
        self.store
            .find_by_order_number(order_number)
            .await?
            .ok_or_else(|| SagaError::OrderNumberNotFound(order_number.to_string()))
    }

    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_all().await?)
    }

    pub async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.find_by_user(user_id).await?)
    }

    pub async fn count_by_user(&self, user_id: UserId) -> Result<u64> {
        Ok(self.store.count_by_user(user_id).await?)
    }

    pub async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self.store.find_by_status(status).await?)
    }

    /// Returns pending orders whose deadline is before `now`.
    pub async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self.store.find_expired(now).await?)
    }

    /// Administrative delete.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: OrderId) -> Result<()> {
        match self.store.delete(id).await {
            Ok(()) => {
                tracing::info!(%id, "order deleted");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Err(SagaError::OrderNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::Money;
    use domain::{OrderItem, PaymentMethod};
    use store::InMemoryOrderStore;

    use super::*;

    fn service() -> OrderService<InMemoryOrderStore> {
        OrderService::new(InMemoryOrderStore::new(), Duration::from_secs(600))
    }

    fn cmd() -> PlaceOrder {
        PlaceOrder::new(
            UserId::new(1),
            vec![
                OrderItem::new(1, "Widget A", 2, Money::from_cents(1000)),
                OrderItem::new(2, "Widget B", 1, Money::from_cents(500)),
            ],
            "1 Main St",
            PaymentMethod::CreditCard,
        )
    }

    #[tokio::test]
    async fn test_place_persists_pending_order() {
        let service = service();
        let order = service.place(cmd()).await.unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_cents(2500));
        let stored = service.get(order.id()).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_place_rejects_empty_order() {
        let service = service();
        let mut empty = cmd();
        empty.items.clear();

        let result = service.place(empty).await;
        assert!(matches!(result, Err(SagaError::Domain(_))));
        assert!(service.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_advance_is_noop_on_terminal_order() {
        let service = service();
        let order = service.place(cmd()).await.unwrap();

        let first = service
            .advance(order.id(), OrderOutcome::PaymentConfirmed)
            .await
            .unwrap();
        let second = service
            .advance(order.id(), OrderOutcome::PaymentFailed)
            .await
            .unwrap();

        assert!(first.is_applied());
        assert_eq!(
            second,
            Transition::NoOp {
                current: OrderStatus::Confirmed
            }
        );
    }

    #[tokio::test]
    async fn test_advance_unknown_order() {
        let result = service()
            .advance(OrderId::new(99), OrderOutcome::Expired)
            .await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_advance_has_single_winner() {
        let service = Arc::new(service());
        let order = service.place(cmd()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let service = Arc::clone(&service);
            let outcome = if i % 2 == 0 {
                OrderOutcome::PaymentConfirmed
            } else {
                OrderOutcome::Expired
            };
            let order_id = order.id();
            handles.push(tokio::spawn(async move {
                service.advance(order_id, outcome).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert!(service.get(order.id()).await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_update_status_rejects_pending_target() {
        let service = service();
        let order = service.place(cmd()).await.unwrap();

        let result = service.update_status(order.id(), OrderStatus::Pending).await;
        assert!(matches!(result, Err(SagaError::Domain(_))));

        let transition = service
            .update_status(order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(transition.is_applied());
    }

    #[tokio::test]
    async fn test_delete_missing_order() {
        let result = service().delete(OrderId::new(1)).await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
    }

    /// Order store whose rows disappear just before they are written back.
    struct DeletedMidUpdate(InMemoryOrderStore);

    #[async_trait::async_trait]
    impl OrderStore for DeletedMidUpdate {
        async fn insert(&self, order: NewOrder) -> store::Result<Order> {
            self.0.insert(order).await
        }

        async fn get(&self, id: OrderId) -> store::Result<Option<Order>> {
            self.0.get(id).await
        }

        async fn find_by_order_number(&self, order_number: &str) -> store::Result<Option<Order>> {
            self.0.find_by_order_number(order_number).await
        }

        async fn list_all(&self) -> store::Result<Vec<Order>> {
            self.0.list_all().await
        }

        async fn find_by_user(&self, user_id: UserId) -> store::Result<Vec<Order>> {
            self.0.find_by_user(user_id).await
        }

        async fn count_by_user(&self, user_id: UserId) -> store::Result<u64> {
            self.0.count_by_user(user_id).await
        }

        async fn find_by_status(&self, status: OrderStatus) -> store::Result<Vec<Order>> {
            self.0.find_by_status(status).await
        }

        async fn find_expired(&self, now: DateTime<Utc>) -> store::Result<Vec<Order>> {
            self.0.find_expired(now).await
        }

        async fn update(&self, order: &Order) -> store::Result<Order> {
            self.0.delete(order.id()).await?;
            self.0.update(order).await
        }

        async fn delete(&self, id: OrderId) -> store::Result<()> {
            self.0.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_advance_on_concurrently_deleted_order() {
        let service = OrderService::new(
            DeletedMidUpdate(InMemoryOrderStore::new()),
            Duration::from_secs(600),
        );
        let order = service.place(cmd()).await.unwrap();

        let result = service.advance(order.id(), OrderOutcome::Expired).await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(id)) if id == order.id()));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = InMemoryOrderStore::new();
        let service = OrderService::new(store.clone(), Duration::from_secs(600));
        let order = service.place(cmd()).await.unwrap();
        store.fail_updates_for(order.id()).await;

        let result = service.advance(order.id(), OrderOutcome::Expired).await;
        assert!(matches!(
            result,
            Err(SagaError::Store(StoreError::Unavailable(_)))
        ));
    }
}
