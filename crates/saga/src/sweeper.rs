//! Expiration sweeper.
//!
//! Cancels orders that are still `PENDING` after their deadline. It is the
//! backstop for payment notifications that never arrive, so it must reach
//! the same end state regardless of what the notification path does: each
//! expired order goes through [`OrderService::advance`], and an order that a
//! notification resolved first is simply skipped.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::{OrderOutcome, Transition};
use futures_util::{StreamExt, stream};
use store::OrderStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SweeperConfig;
use crate::error::{Result, SagaError};
use crate::order_service::OrderService;

/// Summary of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired pending orders found.
    pub examined: usize,
    /// Orders this run cancelled.
    pub cancelled: usize,
    /// Orders resolved (or deleted) by someone else before this run got to them.
    pub skipped: usize,
    /// Orders that could not be updated.
    pub failed: usize,
}

/// Periodically cancels expired pending orders.
pub struct ExpirationSweeper<S: OrderStore> {
    orders: Arc<OrderService<S>>,
    config: SweeperConfig,
}

impl<S: OrderStore> ExpirationSweeper<S> {
    pub fn new(orders: Arc<OrderService<S>>, config: SweeperConfig) -> Self {
        Self { orders, config }
    }

    /// Runs one sweep against the current time.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one sweep, treating `now` as the current time.
    ///
    /// Fails only if the expired orders cannot be listed. Per-order failures
    /// are logged and counted, and the rest of the batch still runs.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let expired = self.orders.find_expired(now).await?;

        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        let orders = &self.orders;
        let results: Vec<_> = stream::iter(expired)
            .map(|order| async move {
                let id = order.id();
                (id, orders.advance(id, OrderOutcome::Expired).await)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (order_id, result) in results {
            match result {
                Ok(Transition::Applied { .. }) => report.cancelled += 1,
                Ok(Transition::NoOp { .. }) | Err(SagaError::OrderNotFound(_)) => {
                    report.skipped += 1
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%order_id, error = %e, "failed to expire order");
                }
            }
        }

        metrics::counter!("sweeper_orders_expired_total").increment(report.cancelled as u64);
        metrics::counter!("sweeper_failures_total").increment(report.failed as u64);
        metrics::histogram!("sweeper_run_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                cancelled = report.cancelled,
                skipped = report.skipped,
                failed = report.failed,
                "sweep finished"
            );
        } else {
            tracing::debug!("sweep found no expired orders");
        }
        Ok(report)
    }
}

impl<S: OrderStore + 'static> ExpirationSweeper<S> {
    /// Runs the sweeper every [`SweeperConfig::period`] until `shutdown`
    /// flips to true or its sender is dropped. The first sweep runs at once.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.period();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval = ?period, "expiration sweeper started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("expiration sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use common::{Money, UserId};
    use domain::{OrderItem, OrderStatus, PaymentMethod, PlaceOrder};
    use store::InMemoryOrderStore;

    use super::*;

    fn service(timeout: Duration) -> Arc<OrderService<InMemoryOrderStore>> {
        Arc::new(OrderService::new(InMemoryOrderStore::new(), timeout))
    }

    fn command() -> PlaceOrder {
        PlaceOrder::new(
            UserId::new(1),
            vec![OrderItem::new(1, "Widget", 1, Money::from_cents(100))],
            "1 Main St",
            PaymentMethod::Paypal,
        )
    }

    fn sweeper(
        orders: &Arc<OrderService<InMemoryOrderStore>>,
    ) -> ExpirationSweeper<InMemoryOrderStore> {
        ExpirationSweeper::new(Arc::clone(orders), SweeperConfig::default())
    }

    #[tokio::test]
    async fn test_sweep_cancels_only_expired_orders() {
        let orders = service(Duration::from_secs(60));
        let order = orders.place(command()).await.unwrap();
        let sweeper = sweeper(&orders);

        let early = sweeper.sweep_at(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let later = Utc::now() + TimeDelta::minutes(2);
        let report = sweeper.sweep_at(later).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.cancelled, 1);

        let stored = orders.get(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
        assert_eq!(stored.expires_at(), None);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let orders = service(Duration::from_secs(60));
        orders.place(command()).await.unwrap();
        let sweeper = sweeper(&orders);
        let later = Utc::now() + TimeDelta::minutes(2);

        sweeper.sweep_at(later).await.unwrap();
        let second = sweeper.sweep_at(later).await.unwrap();
        assert_eq!(second.examined, 0);
    }

    #[tokio::test]
    async fn test_sweep_leaves_resolved_orders_alone() {
        let orders = service(Duration::from_secs(60));
        let order = orders.place(command()).await.unwrap();
        orders
            .advance(order.id(), OrderOutcome::PaymentConfirmed)
            .await
            .unwrap();

        let report = sweeper(&orders)
            .sweep_at(Utc::now() + TimeDelta::minutes(2))
            .await
            .unwrap();

        assert_eq!(report.examined, 0);
        assert_eq!(
            orders.get(order.id()).await.unwrap().status(),
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let orders = service(Duration::from_secs(60));
        let broken = orders.place(command()).await.unwrap();
        let healthy = orders.place(command()).await.unwrap();
        orders.store().fail_updates_for(broken.id()).await;

        let report = sweeper(&orders)
            .sweep_at(Utc::now() + TimeDelta::minutes(2))
            .await
            .unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            orders.get(healthy.id()).await.unwrap().status(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            orders.get(broken.id()).await.unwrap().status(),
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let orders = service(Duration::ZERO);
        let order = orders.place(command()).await.unwrap();
        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&orders),
            SweeperConfig {
                interval: Duration::from_millis(10),
                concurrency: 2,
            },
        ));

        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            orders.get(order.id()).await.unwrap().status(),
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_zero_interval_is_raised_to_minimum() {
        let orders = service(Duration::ZERO);
        let order = orders.place(command()).await.unwrap();
        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&orders),
            SweeperConfig {
                interval: Duration::ZERO,
                concurrency: 1,
            },
        ));

        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            orders.get(order.id()).await.unwrap().status(),
            OrderStatus::Cancelled
        );
    }
}
