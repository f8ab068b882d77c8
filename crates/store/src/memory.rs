use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, UserId};
use domain::{NewOrder, NewPayment, Order, OrderStatus, Payment, PaymentStatus};
use tokio::sync::RwLock;

use crate::{OrderStore, PaymentStore, Result, StoreError};

#[derive(Default)]
struct OrderTables {
    last_id: i64,
    rows: BTreeMap<OrderId, Order>,
    by_number: HashMap<String, OrderId>,
    by_user: HashMap<UserId, BTreeSet<OrderId>>,
    by_status: HashMap<OrderStatus, BTreeSet<OrderId>>,
    /// Deadline index over pending orders only.
    pending_expiry: BTreeSet<(DateTime<Utc>, OrderId)>,
    failing_updates: HashSet<OrderId>,
}

impl OrderTables {
    fn index(&mut self, order: &Order) {
        let id = order.id();
        self.by_number.insert(order.order_number().to_string(), id);
        self.by_user.entry(order.user_id()).or_default().insert(id);
        self.by_status.entry(order.status()).or_default().insert(id);
        if order.status() == OrderStatus::Pending
            && let Some(deadline) = order.expires_at()
        {
            self.pending_expiry.insert((deadline, id));
        }
    }

    fn unindex(&mut self, order: &Order) {
        let id = order.id();
        self.by_number.remove(order.order_number());
        if let Some(ids) = self.by_user.get_mut(&order.user_id()) {
            ids.remove(&id);
        }
        if let Some(ids) = self.by_status.get_mut(&order.status()) {
            ids.remove(&id);
        }
        if let Some(deadline) = order.expires_at() {
            self.pending_expiry.remove(&(deadline, id));
        }
    }

    fn collect<'a>(&self, ids: impl IntoIterator<Item = &'a OrderId>) -> Vec<Order> {
        ids.into_iter()
            .filter_map(|id| self.rows.get(id))
            .cloned()
            .collect()
    }
}

/// In-memory order store.
///
/// Keeps secondary indexes on order number, user, status and pending
/// deadline so lookups behave like the indexed PostgreSQL queries.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.rows.len()
    }

    /// Makes every subsequent update of `id` fail with `Unavailable`.
    pub async fn fail_updates_for(&self, id: OrderId) {
        self.tables.write().await.failing_updates.insert(id);
    }

    /// Clears all injected failures.
    pub async fn clear_failures(&self) {
        self.tables.write().await.failing_updates.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;

        if tables.by_number.contains_key(order.order_number()) {
            return Err(StoreError::DuplicateKey {
                entity: "order",
                field: "order_number",
                value: order.order_number().to_string(),
            });
        }

        tables.last_id += 1;
        let order = order.into_order(OrderId::new(tables.last_id));
        tables.index(&order);
        tables.rows.insert(order.id(), order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.rows.get(&id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_number
            .get(order_number)
            .and_then(|id| tables.rows.get(id))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.rows.values().cloned().collect())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_user
            .get(&user_id)
            .map(|ids| tables.collect(ids))
            .unwrap_or_default())
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_user
            .get(&user_id)
            .map_or(0, |ids| ids.len() as u64))
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_status
            .get(&status)
            .map(|ids| tables.collect(ids))
            .unwrap_or_default())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let ids: Vec<&OrderId> = tables
            .pending_expiry
            .iter()
            .take_while(|(deadline, _)| *deadline < now)
            .map(|(_, id)| id)
            .collect();
        Ok(tables.collect(ids))
    }

    async fn update(&self, order: &Order) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let id = order.id();

        if tables.failing_updates.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "updates to order {id} are failing"
            )));
        }

        let current = tables
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "order",
                id: id.as_i64(),
            })?;

        if current.version() != order.version() {
            return Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: id.as_i64(),
                expected: order.version(),
                actual: current.version(),
            });
        }

        let mut updated = order.clone();
        updated.set_version(current.version().next());

        tables.unindex(&current);
        tables.index(&updated);
        tables.rows.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables.rows.remove(&id).ok_or(StoreError::NotFound {
            entity: "order",
            id: id.as_i64(),
        })?;
        tables.unindex(&order);
        Ok(())
    }
}

#[derive(Default)]
struct PaymentTables {
    last_id: i64,
    rows: BTreeMap<PaymentId, Payment>,
    by_reference: HashMap<String, PaymentId>,
    by_order: HashMap<OrderId, PaymentId>,
    by_status: HashMap<PaymentStatus, BTreeSet<PaymentId>>,
}

impl PaymentTables {
    fn index(&mut self, payment: &Payment) {
        let id = payment.id();
        self.by_reference.insert(payment.reference().to_string(), id);
        self.by_order.insert(payment.order_id(), id);
        self.by_status.entry(payment.status()).or_default().insert(id);
    }

    fn unindex(&mut self, payment: &Payment) {
        self.by_reference.remove(payment.reference());
        self.by_order.remove(&payment.order_id());
        if let Some(ids) = self.by_status.get_mut(&payment.status()) {
            ids.remove(&payment.id());
        }
    }
}

/// In-memory payment store.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<Payment> {
        let mut tables = self.tables.write().await;

        if tables.by_reference.contains_key(payment.reference()) {
            return Err(StoreError::DuplicateKey {
                entity: "payment",
                field: "reference",
                value: payment.reference().to_string(),
            });
        }
        if tables.by_order.contains_key(&payment.order_id()) {
            return Err(StoreError::DuplicateKey {
                entity: "payment",
                field: "order_id",
                value: payment.order_id().to_string(),
            });
        }

        tables.last_id += 1;
        let payment = payment.into_payment(PaymentId::new(tables.last_id));
        tables.index(&payment);
        tables.rows.insert(payment.id(), payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.rows.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_order
            .get(&order_id)
            .and_then(|id| tables.rows.get(id))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        Ok(self.tables.read().await.rows.values().cloned().collect())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .values()
            .filter(|payment| payment.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_status
            .get(&status)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.rows.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        let id = payment.id();

        let current = tables
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "payment",
                id: id.as_i64(),
            })?;

        if current.version() != payment.version() {
            return Err(StoreError::ConcurrencyConflict {
                entity: "payment",
                id: id.as_i64(),
                expected: payment.version(),
                actual: current.version(),
            });
        }

        let mut updated = payment.clone();
        updated.set_version(current.version().next());

        tables.unindex(&current);
        tables.index(&updated);
        tables.rows.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: PaymentId) -> Result<()> {
        let mut tables = self.tables.write().await;
        let payment = tables.rows.remove(&id).ok_or(StoreError::NotFound {
            entity: "payment",
            id: id.as_i64(),
        })?;
        tables.unindex(&payment);
        Ok(())
    }
}
