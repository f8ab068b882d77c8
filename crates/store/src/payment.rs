use async_trait::async_trait;
use common::{OrderId, PaymentId, UserId};
use domain::{NewPayment, Payment, PaymentStatus};

use crate::Result;

/// Durable keyed storage for payments.
///
/// There is at most one payment per order. Listing methods return payments
/// in ascending id order.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Stores a new payment, assigning its id and version 1.
    ///
    /// Fails with `DuplicateKey` if the reference is taken or the order
    /// already has a payment.
    async fn insert(&self, payment: NewPayment) -> Result<Payment>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn list_all(&self) -> Result<Vec<Payment>>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Payment>>;

    async fn find_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>>;

    /// Writes back a modified payment with the same version check as
    /// [`OrderStore::update`](crate::OrderStore::update).
    async fn update(&self, payment: &Payment) -> Result<Payment>;

    async fn delete(&self, id: PaymentId) -> Result<()>;
}

#[async_trait]
impl<T: PaymentStore + ?Sized> PaymentStore for std::sync::Arc<T> {
    async fn insert(&self, payment: NewPayment) -> Result<Payment> {
        (**self).insert(payment).await
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        (**self).get(id).await
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        (**self).find_by_order(order_id).await
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        (**self).list_all().await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        (**self).find_by_user(user_id).await
    }

    async fn find_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        (**self).find_by_status(status).await
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        (**self).update(payment).await
    }

    async fn delete(&self, id: PaymentId) -> Result<()> {
        (**self).delete(id).await
    }
}
