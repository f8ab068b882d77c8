//! The synchronous "create payment for order" call and its compensating void.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::PaymentId;
use domain::{Payment, PaymentStatus};
use reqwest::Client;
use store::PaymentStore;

use crate::config::PaymentClientConfig;
use crate::error::{Result, SagaError};
use crate::messages::{CreatePaymentRequest, PaymentAck};
use crate::payment_processor::PaymentProcessor;

use super::{PaymentGateway, PaymentNotifier};

/// Client side of the create-payment RPC.
///
/// A successful call only acknowledges a `PENDING` payment; the charge
/// outcome arrives later as a notification. Failures are reported as
/// `UpstreamUnavailable` (unreachable, timed out, server error) or
/// `PaymentRejected` (the payment service refused the request).
///
/// `void_for_order` is the compensation for a failed create call: the
/// payment service may still store (and charge) the payment after the
/// caller gave up, so the order service voids whatever exists for the order
/// and blocks a later create.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    async fn create_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck>;

    async fn void_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck>;
}

/// Calls the payment service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPaymentClient {
    client: Client,
    create_endpoint: String,
    void_endpoint: String,
}

impl HttpPaymentClient {
    pub fn new(config: &PaymentClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SagaError::Configuration(e.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            create_endpoint: format!("{base_url}/api/payments/create-for-order"),
            void_endpoint: format!("{base_url}/api/payments/void-for-order"),
        })
    }

    async fn post(&self, endpoint: &str, request: &CreatePaymentRequest) -> Result<PaymentAck> {
        let response = self
            .client
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SagaError::UpstreamUnavailable("payment service timed out".to_string())
                } else {
                    SagaError::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<PaymentAck>()
                .await
                .map_err(|e| SagaError::UpstreamUnavailable(format!("invalid response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(SagaError::PaymentRejected(format!("{status}: {body}")))
        } else {
            Err(SagaError::UpstreamUnavailable(format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl PaymentClient for HttpPaymentClient {
    async fn create_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        self.post(&self.create_endpoint, &request).await
    }

    async fn void_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        self.post(&self.void_endpoint, &request).await
    }
}

/// Calls a payment processor living in the same process.
pub struct LocalPaymentClient<S, G, N>
where
    S: PaymentStore,
    G: PaymentGateway,
    N: PaymentNotifier,
{
    processor: Arc<PaymentProcessor<S, G, N>>,
}

impl<S, G, N> LocalPaymentClient<S, G, N>
where
    S: PaymentStore,
    G: PaymentGateway,
    N: PaymentNotifier,
{
    pub fn new(processor: Arc<PaymentProcessor<S, G, N>>) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl<S, G, N> PaymentClient for LocalPaymentClient<S, G, N>
where
    S: PaymentStore + 'static,
    G: PaymentGateway + 'static,
    N: PaymentNotifier + 'static,
{
    async fn create_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        local_ack(self.processor.submit_for_order(request).await)
    }

    async fn void_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        local_ack(self.processor.void_for_order(request).await)
    }
}

/// Maps a processor result the way the HTTP surface would.
fn local_ack(result: Result<Payment>) -> Result<PaymentAck> {
    match result {
        Ok(payment) => Ok(PaymentAck::from(&payment)),
        Err(e) if e.is_client_error() => Err(SagaError::PaymentRejected(e.to_string())),
        Err(e) => Err(SagaError::UpstreamUnavailable(e.to_string())),
    }
}

/// Scripted behaviour of a [`StubPaymentClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubResponse {
    /// Acknowledge with a fresh pending payment.
    Accept,
    /// Refuse the request.
    Reject,
    /// Fail as if the service were down.
    Unavailable,
    /// Never answer.
    Hang,
}

/// Payment client with a scripted response, for tests.
#[derive(Debug)]
pub struct StubPaymentClient {
    response: StubResponse,
    calls: AtomicUsize,
    voids: AtomicUsize,
    last_id: AtomicI64,
}

impl StubPaymentClient {
    pub fn new(response: StubResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            voids: AtomicUsize::new(0),
            last_id: AtomicI64::new(0),
        }
    }

    /// Returns how many requests were received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns how many void requests were received.
    pub fn void_count(&self) -> usize {
        self.voids.load(Ordering::SeqCst)
    }

    fn next_ack(&self, status: PaymentStatus) -> PaymentAck {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        PaymentAck {
            id: PaymentId::new(id),
            reference: domain::codes::payment_reference(),
            status,
        }
    }
}

#[async_trait]
impl PaymentClient for StubPaymentClient {
    async fn create_for_order(&self, _request: CreatePaymentRequest) -> Result<PaymentAck> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.response {
            StubResponse::Accept => Ok(self.next_ack(PaymentStatus::Pending)),
            StubResponse::Reject => Err(SagaError::PaymentRejected("declined by stub".to_string())),
            StubResponse::Unavailable => Err(SagaError::UpstreamUnavailable(
                "connection refused".to_string(),
            )),
            StubResponse::Hang => std::future::pending().await,
        }
    }

    async fn void_for_order(&self, _request: CreatePaymentRequest) -> Result<PaymentAck> {
        self.voids.fetch_add(1, Ordering::SeqCst);
        match self.response {
            StubResponse::Accept | StubResponse::Reject => {
                Ok(self.next_ack(PaymentStatus::Cancelled))
            }
            StubResponse::Unavailable => Err(SagaError::UpstreamUnavailable(
                "connection refused".to_string(),
            )),
            StubResponse::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl<T: PaymentClient + ?Sized> PaymentClient for Arc<T> {
    async fn create_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        (**self).create_for_order(request).await
    }

    async fn void_for_order(&self, request: CreatePaymentRequest) -> Result<PaymentAck> {
        (**self).void_for_order(request).await
    }
}
