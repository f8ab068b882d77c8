use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, UserId};
use domain::{NewOrder, NewPayment, Order, OrderStatus, Payment, PaymentStatus};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::{OrderStore, PaymentStore, Result, StoreError, Version};

/// Runs the database migrations for both tables.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Opens a connection pool and brings the schema up to date.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    run_migrations(&pool).await?;
    tracing::info!("connected to PostgreSQL");
    Ok(pool)
}

/// Maps a unique-constraint violation to `DuplicateKey`, anything else to `Database`.
fn map_insert_error(
    err: sqlx::Error,
    entity: &'static str,
    keys: &[(&str, &'static str, String)],
) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && let Some(constraint) = db_err.constraint()
        && let Some((_, field, value)) = keys.iter().find(|(name, _, _)| *name == constraint)
    {
        return StoreError::DuplicateKey {
            entity,
            field: *field,
            value: value.clone(),
        };
    }
    StoreError::Database(err)
}

/// Turns a zero-row update into the matching error by looking at the current row.
async fn missed_update(
    pool: &PgPool,
    table: &str,
    entity: &'static str,
    id: i64,
    expected: Version,
) -> StoreError {
    let sql = format!("SELECT version FROM {table} WHERE id = $1");
    match sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
    {
        Ok(Some(actual)) => {
            tracing::debug!(entity, id, %expected, actual, "stale update rejected");
            StoreError::ConcurrencyConflict {
                entity,
                id,
                expected,
                actual: Version::new(actual),
            }
        }
        Ok(None) => StoreError::NotFound { entity, id },
        Err(e) => StoreError::Database(e),
    }
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let data: serde_json::Value = row.try_get("data")?;
        let mut order: Order = serde_json::from_value(data)?;
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    async fn fetch_many(&self, sql: &str, bind: Option<i64>) -> Result<Vec<Order>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_order)
            .collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('orders', 'id'))")
            .fetch_one(&self.pool)
            .await?;
        let order = order.into_order(OrderId::new(id));
        let data = serde_json::to_value(&order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, expires_at, version, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(order.order_number())
        .bind(order.user_id().as_i64())
        .bind(order.status().as_str())
        .bind(order.expires_at())
        .bind(order.version().as_i64())
        .bind(&data)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_insert_error(
                e,
                "order",
                &[(
                    "unique_order_number",
                    "order_number",
                    order.order_number().to_string(),
                )],
            )
        })?;

        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query("SELECT version, data FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query("SELECT version, data FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        self.fetch_many("SELECT version, data FROM orders ORDER BY id ASC", None)
            .await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.fetch_many(
            "SELECT version, data FROM orders WHERE user_id = $1 ORDER BY id ASC",
            Some(user_id.as_i64()),
        )
        .await
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        sqlx::query("SELECT version, data FROM orders WHERE status = $1 ORDER BY id ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_order)
            .collect()
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        sqlx::query(
            r#"
            SELECT version, data FROM orders
            WHERE status = $1 AND expires_at < $2
            ORDER BY expires_at ASC, id ASC
            "#,
        )
        .bind(OrderStatus::Pending.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_order)
        .collect()
    }

    async fn update(&self, order: &Order) -> Result<Order> {
        let expected = order.version();
        let mut updated = order.clone();
        updated.set_version(expected.next());
        let data = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, expires_at = $4, version = $5, data = $6, updated_at = $7
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id().as_i64())
        .bind(expected.as_i64())
        .bind(updated.status().as_str())
        .bind(updated.expires_at())
        .bind(updated.version().as_i64())
        .bind(&data)
        .bind(updated.updated_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(
                missed_update(&self.pool, "orders", "order", order.id().as_i64(), expected).await,
            );
        }
        Ok(updated)
    }

    async fn delete(&self, id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "order",
                id: id.as_i64(),
            });
        }
        Ok(())
    }
}

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let data: serde_json::Value = row.try_get("data")?;
        let mut payment: Payment = serde_json::from_value(data)?;
        payment.set_version(Version::new(row.try_get("version")?));
        Ok(payment)
    }

    async fn fetch_many(&self, sql: &str, bind: Option<i64>) -> Result<Vec<Payment>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_payment)
            .collect()
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<Payment> {
        let id: i64 =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('payments', 'id'))")
                .fetch_one(&self.pool)
                .await?;
        let payment = payment.into_payment(PaymentId::new(id));
        let data = serde_json::to_value(&payment)?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, reference, order_id, user_id, status, version, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(payment.reference())
        .bind(payment.order_id().as_i64())
        .bind(payment.user_id().as_i64())
        .bind(payment.status().as_str())
        .bind(payment.version().as_i64())
        .bind(&data)
        .bind(payment.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_insert_error(
                e,
                "payment",
                &[
                    (
                        "unique_payment_reference",
                        "reference",
                        payment.reference().to_string(),
                    ),
                    (
                        "unique_payment_order",
                        "order_id",
                        payment.order_id().to_string(),
                    ),
                ],
            )
        })?;

        Ok(payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        sqlx::query("SELECT version, data FROM payments WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_payment)
            .transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        sqlx::query("SELECT version, data FROM payments WHERE order_id = $1")
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_payment)
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        self.fetch_many("SELECT version, data FROM payments ORDER BY id ASC", None)
            .await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        self.fetch_many(
            "SELECT version, data FROM payments WHERE user_id = $1 ORDER BY id ASC",
            Some(user_id.as_i64()),
        )
        .await
    }

    async fn find_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        sqlx::query("SELECT version, data FROM payments WHERE status = $1 ORDER BY id ASC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        let expected = payment.version();
        let mut updated = payment.clone();
        updated.set_version(expected.next());
        let data = serde_json::to_value(&updated)?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, version = $4, data = $5
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(payment.id().as_i64())
        .bind(expected.as_i64())
        .bind(updated.status().as_str())
        .bind(updated.version().as_i64())
        .bind(&data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(missed_update(
                &self.pool,
                "payments",
                "payment",
                payment.id().as_i64(),
                expected,
            )
            .await);
        }
        Ok(updated)
    }

    async fn delete(&self, id: PaymentId) -> Result<()> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payment",
                id: id.as_i64(),
            });
        }
        Ok(())
    }
}
