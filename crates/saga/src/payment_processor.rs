//! Payment processor: the payment state machine over a [`PaymentStore`].

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, PaymentId, UserId};
use domain::{CreatePayment, NewPayment, Payment, PaymentMethod, PaymentStatus};
use store::{PaymentStore, StoreError};

use crate::error::{Result, SagaError};
use crate::messages::{CreatePaymentRequest, PaymentNotification};
use crate::services::{PaymentGateway, PaymentNotifier};

/// Attempts at finding an unused payment reference before giving up.
const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Read-modify-write rounds `void_for_order` makes when it keeps losing races.
const MAX_VOID_ATTEMPTS: usize = 5;

/// Creates payments, runs them through the gateway and reports outcomes.
pub struct PaymentProcessor<S, G, N>
where
    S: PaymentStore,
    G: PaymentGateway,
    N: PaymentNotifier,
{
    store: S,
    gateway: G,
    notifier: N,
}

impl<S, G, N> PaymentProcessor<S, G, N>
where
    S: PaymentStore,
    G: PaymentGateway,
    N: PaymentNotifier,
{
    pub fn new(store: S, gateway: G, notifier: N) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a `PENDING` payment for an order.
    ///
    /// An order has at most one payment: if one already exists it is
    /// returned unchanged, so a retried request creates nothing new.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_for_order(&self, request: CreatePaymentRequest) -> Result<Payment> {
        let method: PaymentMethod = request.method.parse()?;

        if let Some(existing) = self.store.find_by_order(request.order_id).await? {
            tracing::info!(payment_id = %existing.id(), "payment already exists for order");
            return Ok(existing);
        }

        let mut draft = NewPayment::create(
            CreatePayment {
                order_id: request.order_id,
                user_id: request.user_id,
                amount: request.amount,
                method,
            },
            Utc::now(),
        )?;

        let mut attempt = 1;
        loop {
            match self.store.insert(draft.clone()).await {
                Ok(payment) => {
                    metrics::counter!("payments_created_total").increment(1);
                    tracing::info!(
                        payment_id = %payment.id(),
                        reference = payment.reference(),
                        amount = %payment.amount(),
                        "payment created"
                    );
                    return Ok(payment);
                }
                Err(StoreError::DuplicateKey {
                    field: "order_id", ..
                }) => {
                    return self
                        .store
                        .find_by_order(request.order_id)
                        .await?
                        .ok_or(SagaError::NoPaymentForOrder(request.order_id));
                }
                Err(StoreError::DuplicateKey {
                    field: "reference", ..
                }) if attempt < MAX_REFERENCE_ATTEMPTS => {
                    draft.rereference();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs the gateway for a payment and records the outcome.
    ///
    /// The gateway is invoked at most once per payment: the payment is first
    /// claimed by moving it to `PROCESSING` under the version check, and only
    /// the caller whose claim was stored charges it. On a payment that is
    /// already terminal (or claimed by someone else) the stored record is
    /// returned unchanged. Reaching a terminal state emits one notification.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, id: PaymentId) -> Result<Payment> {
        let mut payment = self.get(id).await?;
        if !payment.status().can_process() {
            tracing::debug!(status = %payment.status(), "payment already processed");
            return Ok(payment);
        }

        payment.begin_processing()?;
        let claimed = match self.store.update(&payment).await {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => return self.get(id).await,
            Err(e) => return Err(e.into()),
        };

        let outcome = self.gateway.charge(&claimed).await;

        let mut resolved = claimed;
        resolved.record_outcome(outcome, Utc::now())?;
        let resolved = match self.store.update(&resolved).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_conflict() => {
                tracing::warn!("payment changed while charging, keeping stored record");
                return self.get(id).await;
            }
            Err(e) => return Err(e.into()),
        };

        let status = resolved.status();
        metrics::counter!("payments_processed_total", "status" => status.as_str()).increment(1);
        if status == PaymentStatus::Completed {
            tracing::info!(
                order_id = %resolved.order_id(),
                transaction_id = resolved.transaction_id().unwrap_or_default(),
                "payment completed"
            );
        } else {
            tracing::warn!(
                order_id = %resolved.order_id(),
                reason = resolved.gateway_response().unwrap_or_default(),
                "payment failed"
            );
        }

        self.notifier
            .notify(PaymentNotification::new(resolved.order_id(), status))
            .await;
        Ok(resolved)
    }

    /// Administrative status override.
    ///
    /// Only changes the transition table allows are accepted; a payment is
    /// never moved back to `PENDING` or `PROCESSING`. Setting the current
    /// status again changes nothing. Moving to a terminal status it did not
    /// already have notifies the order service.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: PaymentId, status: PaymentStatus) -> Result<Payment> {
        let mut payment = self.get(id).await?;
        let previous = payment.set_status(status, Utc::now())?;
        if previous == status {
            return Ok(payment);
        }
        let payment = self.store.update(&payment).await?;
        tracing::info!(%previous, %status, "payment status updated by administrator");

        if status.is_terminal() {
            self.notifier
                .notify(PaymentNotification::new(payment.order_id(), status))
                .await;
        }
        Ok(payment)
    }

    /// Voids the payment of an order whose placement was compensated.
    ///
    /// A pending payment is cancelled before the gateway sees it and a
    /// completed one is refunded. When no payment exists yet a `CANCELLED`
    /// one is stored in its place, so a create request that arrives later
    /// returns it and charges nothing. A payment already being charged is
    /// returned unchanged. No notification is sent: the order service asked
    /// for the void and has already cancelled the order.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn void_for_order(&self, request: CreatePaymentRequest) -> Result<Payment> {
        let order_id = request.order_id;
        let mut attempt = 1;
        loop {
            let Some(mut payment) = self.store.find_by_order(order_id).await? else {
                match self.insert_voided(&request).await {
                    Ok(payment) => {
                        metrics::counter!("payments_voided_total", "from" => "absent")
                            .increment(1);
                        tracing::info!(payment_id = %payment.id(), "payment voided before creation");
                        return Ok(payment);
                    }
                    Err(SagaError::Store(StoreError::DuplicateKey {
                        field: "order_id", ..
                    })) if attempt < MAX_VOID_ATTEMPTS => {
                        attempt += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            let from = payment.status();
            let target = match from {
                PaymentStatus::Pending => PaymentStatus::Cancelled,
                PaymentStatus::Completed => PaymentStatus::Refunded,
                PaymentStatus::Processing => {
                    tracing::warn!(payment_id = %payment.id(), "payment is being charged, cannot void");
                    return Ok(payment);
                }
                _ => return Ok(payment),
            };

            payment.set_status(target, Utc::now())?;
            match self.store.update(&payment).await {
                Ok(payment) => {
                    metrics::counter!("payments_voided_total", "from" => from.as_str())
                        .increment(1);
                    tracing::info!(payment_id = %payment.id(), %from, to = %target, "payment voided");
                    return Ok(payment);
                }
                Err(e) if e.is_conflict() && attempt < MAX_VOID_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn insert_voided(&self, request: &CreatePaymentRequest) -> Result<Payment> {
        let mut draft = NewPayment::create(
            CreatePayment {
                order_id: request.order_id,
                user_id: request.user_id,
                amount: request.amount,
                method: request.method.parse()?,
            },
            Utc::now(),
        )?;
        draft.void();

        let mut attempt = 1;
        loop {
            match self.store.insert(draft.clone()).await {
                Ok(payment) => return Ok(payment),
                Err(StoreError::DuplicateKey {
                    field: "reference", ..
                }) if attempt < MAX_REFERENCE_ATTEMPTS => {
                    draft.rereference();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .get(id)
            .await?
            .ok_or(SagaError::PaymentNotFound(id))
    }

    pub async fn find_by_order(&self, order_id: OrderId) -> Result<Payment> {
        self.store
            .find_by_order(order_id)
            .await?
            .ok_or(SagaError::NoPaymentForOrder(order_id))
    }

    pub async fn list_all(&self) -> Result<Vec<Payment>> {
        Ok(self.store.list_all().await?)
    }

    pub async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        Ok(self.store.find_by_user(user_id).await?)
    }

    pub async fn find_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        Ok(self.store.find_by_status(status).await?)
    }

    /// Administrative delete.
    pub async fn delete(&self, id: PaymentId) -> Result<()> {
        match self.store.delete(id).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(SagaError::PaymentNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S, G, N> PaymentProcessor<S, G, N>
where
    S: PaymentStore + 'static,
    G: PaymentGateway + 'static,
    N: PaymentNotifier + 'static,
{
    /// Creates the payment and schedules its processing in the background.
    ///
    /// Returns as soon as the `PENDING` payment is stored, so the caller
    /// never waits on the gateway.
    pub async fn submit_for_order(self: &Arc<Self>, request: CreatePaymentRequest) -> Result<Payment> {
        let payment = self.create_for_order(request).await?;

        if payment.status().can_process() {
            let processor = Arc::clone(self);
            let id = payment.id();
            tokio::spawn(async move {
                if let Err(e) = processor.process(id).await {
                    tracing::error!(payment_id = %id, error = %e, "background payment processing failed");
                }
            });
        }
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::{DomainError, PaymentError};
    use store::InMemoryPaymentStore;
    use tokio::sync::mpsc;

    use super::*;
    use crate::services::{ChannelNotifier, FixedGateway};

    type TestProcessor = PaymentProcessor<InMemoryPaymentStore, Arc<FixedGateway>, ChannelNotifier>;

    fn processor(
        gateway: FixedGateway,
    ) -> (
        TestProcessor,
        Arc<FixedGateway>,
        mpsc::UnboundedReceiver<PaymentNotification>,
    ) {
        let gateway = Arc::new(gateway);
        let (notifier, rx) = ChannelNotifier::new();
        (
            PaymentProcessor::new(InMemoryPaymentStore::new(), Arc::clone(&gateway), notifier),
            gateway,
            rx,
        )
    }

    fn request(order_id: i64, amount: i64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id: OrderId::new(order_id),
            user_id: UserId::new(1),
            amount: Money::from_cents(amount),
            method: "credit_card".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_for_order_is_pending() {
        let (processor, gateway, _rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(1, 2500)).await.unwrap();

        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert_eq!(payment.method(), PaymentMethod::CreditCard);
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_negative_amount_and_unknown_method() {
        let (processor, _, _rx) = processor(FixedGateway::approving());

        let negative = processor.create_for_order(request(1, -5)).await;
        assert!(negative.unwrap_err().is_client_error());

        let mut unknown = request(2, 100);
        unknown.method = "BARTER".to_string();
        assert!(processor.create_for_order(unknown).await.unwrap_err().is_client_error());
        assert!(processor.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_returns_existing_payment() {
        let (processor, _, _rx) = processor(FixedGateway::approving());
        let first = processor.create_for_order(request(1, 2500)).await.unwrap();
        let second = processor.create_for_order(request(1, 2500)).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(processor.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_process_completes_and_notifies() {
        let (processor, _, mut rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(4, 2500)).await.unwrap();

        let processed = processor.process(payment.id()).await.unwrap();

        assert_eq!(processed.status(), PaymentStatus::Completed);
        assert!(processed.processed_at().is_some());
        let notification = rx.recv().await.unwrap();
        assert_eq!(
            notification,
            PaymentNotification::new(OrderId::new(4), PaymentStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_process_twice_runs_gateway_once() {
        let (processor, gateway, mut rx) = processor(FixedGateway::declining());
        let payment = processor.create_for_order(request(1, 2500)).await.unwrap();

        let first = processor.process(payment.id()).await.unwrap();
        let second = processor.process(payment.id()).await.unwrap();

        assert_eq!(first.status(), PaymentStatus::Failed);
        assert_eq!(first.transaction_id(), second.transaction_id());
        assert_eq!(first, second);
        assert_eq!(gateway.call_count(), 1);

        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_process_charges_once() {
        let (processor, gateway, _rx) = processor(FixedGateway::approving());
        let processor = Arc::new(processor);
        let payment = processor.create_for_order(request(1, 2500)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let processor = Arc::clone(&processor);
            let payment_id = payment.id();
            handles.push(tokio::spawn(async move {
                processor.process(payment_id).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(gateway.call_count(), 1);
        assert_eq!(
            processor.get(payment.id()).await.unwrap().status(),
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_submit_processes_in_background() {
        let (processor, _, mut rx) = processor(FixedGateway::approving());
        let processor = Arc::new(processor);

        let payment = processor.submit_for_order(request(9, 100)).await.unwrap();
        assert_eq!(payment.status(), PaymentStatus::Pending);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.order_id, OrderId::new(9));
        assert_eq!(
            processor.get(payment.id()).await.unwrap().status(),
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_admin_update_notifies_on_terminal_status() {
        let (processor, gateway, mut rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(3, 100)).await.unwrap();

        let cancelled = processor
            .update_status(payment.id(), PaymentStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), PaymentStatus::Cancelled);
        assert_eq!(rx.recv().await.unwrap().status, "CANCELLED");

        // Cancelled payments are never charged.
        processor.process(payment.id()).await.unwrap();
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_admin_update_cannot_reopen_processed_payment() {
        let (processor, gateway, mut rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(3, 100)).await.unwrap();
        let charged = processor.process(payment.id()).await.unwrap();
        rx.recv().await.unwrap();

        for target in [PaymentStatus::Pending, PaymentStatus::Processing] {
            let err = processor.update_status(payment.id(), target).await.unwrap_err();
            assert!(matches!(
                err,
                SagaError::Domain(DomainError::Payment(
                    PaymentError::StatusChangeNotAllowed { .. }
                ))
            ));
        }

        let again = processor.process(payment.id()).await.unwrap();
        assert_eq!(again.transaction_id(), charged.transaction_id());
        assert_eq!(gateway.call_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admin_refund_of_completed_payment() {
        let (processor, _, mut rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(3, 100)).await.unwrap();
        processor.process(payment.id()).await.unwrap();
        rx.recv().await.unwrap();

        let refunded = processor
            .update_status(payment.id(), PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.status(), PaymentStatus::Refunded);
        assert_eq!(rx.recv().await.unwrap().status, "REFUNDED");

        // Repeating the same status is a no-op and sends nothing.
        processor
            .update_status(payment.id(), PaymentStatus::Refunded)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_void_cancels_pending_payment() {
        let (processor, gateway, mut rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(5, 2500)).await.unwrap();

        let voided = processor.void_for_order(request(5, 2500)).await.unwrap();
        assert_eq!(voided.id(), payment.id());
        assert_eq!(voided.status(), PaymentStatus::Cancelled);

        processor.process(payment.id()).await.unwrap();
        assert_eq!(gateway.call_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_void_before_create_blocks_late_payment() {
        let (processor, gateway, _rx) = processor(FixedGateway::approving());
        let processor = Arc::new(processor);

        let voided = processor.void_for_order(request(6, 2500)).await.unwrap();
        assert_eq!(voided.status(), PaymentStatus::Cancelled);
        assert_eq!(voided.amount(), Money::from_cents(2500));

        let late = processor.submit_for_order(request(6, 2500)).await.unwrap();
        assert_eq!(late.id(), voided.id());
        assert_eq!(late.status(), PaymentStatus::Cancelled);
        tokio::task::yield_now().await;
        assert_eq!(gateway.call_count(), 0);
        assert_eq!(processor.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_void_refunds_completed_payment() {
        let (processor, _, _rx) = processor(FixedGateway::approving());
        let payment = processor.create_for_order(request(7, 2500)).await.unwrap();
        processor.process(payment.id()).await.unwrap();

        let voided = processor.void_for_order(request(7, 2500)).await.unwrap();
        assert_eq!(voided.status(), PaymentStatus::Refunded);

        let again = processor.void_for_order(request(7, 2500)).await.unwrap();
        assert_eq!(again.status(), PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let (processor, _, _rx) = processor(FixedGateway::approving());
        assert!(matches!(
            processor.get(PaymentId::new(1)).await,
            Err(SagaError::PaymentNotFound(_))
        ));
        assert!(matches!(
            processor.find_by_order(OrderId::new(1)).await,
            Err(SagaError::NoPaymentForOrder(_))
        ));
        assert!(matches!(
            processor.delete(PaymentId::new(1)).await,
            Err(SagaError::PaymentNotFound(_))
        ));
    }
}
