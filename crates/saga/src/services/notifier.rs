//! Delivery of payment outcomes back to the order service.

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;

use crate::config::NotifierConfig;
use crate::error::{Result, SagaError};
use crate::messages::PaymentNotification;

/// Sends one payment outcome to the order service.
///
/// Delivery is best effort: implementations retry within their own bounds
/// and log a permanent failure instead of returning it. The expiration
/// sweeper reclaims orders whose notification never arrived.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify(&self, notification: PaymentNotification);
}

/// Posts notifications to the order service webhook with bounded retry.
#[derive(Debug, Clone)]
pub struct HttpWebhookNotifier {
    client: Client,
    config: NotifierConfig,
}

impl HttpWebhookNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SagaError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Attempts per notification; always at least one retry after the first try.
    fn attempts(&self) -> u32 {
        self.config.max_attempts.max(2)
    }

    async fn deliver_once(
        &self,
        notification: &PaymentNotification,
    ) -> std::result::Result<(), String> {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(notification)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("webhook responded with {status}"))
        }
    }
}

#[async_trait]
impl PaymentNotifier for HttpWebhookNotifier {
    #[tracing::instrument(
        skip(self, notification),
        fields(order_id = %notification.order_id, status = %notification.status)
    )]
    async fn notify(&self, notification: PaymentNotification) {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            match self.deliver_once(&notification).await {
                Ok(()) => {
                    metrics::counter!("webhook_deliveries_total", "result" => "delivered")
                        .increment(1);
                    tracing::info!(attempt, "payment notification delivered");
                    return;
                }
                Err(error) if attempt < attempts => {
                    metrics::counter!("webhook_deliveries_total", "result" => "retried")
                        .increment(1);
                    tracing::warn!(
                        %error,
                        attempt,
                        delay_ms = self.config.retry_delay.as_millis(),
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(error) => {
                    metrics::counter!("webhook_deliveries_total", "result" => "failed")
                        .increment(1);
                    tracing::error!(%error, attempts, "webhook delivery failed permanently");
                }
            }
        }
    }
}

/// Hands notifications to an in-process channel.
///
/// Used when both services run in one process and in tests that want to
/// control when a notification is applied.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<PaymentNotification>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PaymentNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PaymentNotifier for ChannelNotifier {
    async fn notify(&self, notification: PaymentNotification) {
        if self.tx.send(notification).is_err() {
            tracing::error!("notification receiver dropped");
        }
    }
}

#[async_trait]
impl<T: PaymentNotifier + ?Sized> PaymentNotifier for std::sync::Arc<T> {
    async fn notify(&self, notification: PaymentNotification) {
        (**self).notify(notification).await
    }
}
