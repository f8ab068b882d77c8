use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{NewOrder, Order, OrderStatus};

use crate::Result;

/// Durable keyed storage for orders.
///
/// All implementations must be thread-safe (Send + Sync). Listing methods
/// return orders in ascending id order.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order, assigning its id and version 1.
    ///
    /// Fails with `DuplicateKey` if the order number is already taken.
    async fn insert(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves an order by its human-readable number.
    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>>;

    async fn list_all(&self) -> Result<Vec<Order>>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    async fn count_by_user(&self, user_id: UserId) -> Result<u64>;

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Returns pending orders whose deadline is strictly before `now`,
    /// earliest deadline first.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;

    /// Writes back a modified order.
    ///
    /// The write only succeeds if `order.version()` is still the stored
    /// version; otherwise `ConcurrencyConflict` is returned and nothing
    /// changes. On success the stored order is returned with its version
    /// incremented.
    async fn update(&self, order: &Order) -> Result<Order>;

    /// Removes an order. Fails with `NotFound` if it does not exist.
    async fn delete(&self, id: OrderId) -> Result<()>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        (**self).insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get(id).await
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        (**self).find_by_order_number(order_number).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        (**self).list_all().await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        (**self).find_by_user(user_id).await
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64> {
        (**self).count_by_user(user_id).await
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        (**self).find_by_status(status).await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        (**self).find_expired(now).await
    }

    async fn update(&self, order: &Order) -> Result<Order> {
        (**self).update(order).await
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        (**self).delete(id).await
    }
}
