//! Inbound payment outcome webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use saga::PaymentNotification;
use serde::Serialize;

use super::orders::OrderAppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WebhookAck {
    pub result: &'static str,
}

/// POST /api/webhooks/payment-status — `{orderId, status}` from the payment service.
///
/// Answers 200 for every reconciliation outcome, including an unknown order
/// or a status that carries no transition. A malformed payload is a 400 and
/// a storage failure a 500, which makes the sender retry.
#[tracing::instrument(skip_all)]
pub async fn payment_status(
    State(state): State<Arc<OrderAppState>>,
    body: Result<Json<PaymentNotification>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(notification) = body?;
    tracing::debug!(
        order_id = %notification.order_id,
        status = %notification.status,
        "payment notification received"
    );

    let outcome = state
        .orchestrator
        .handle_payment_notification(notification.order_id, &notification.status)
        .await?;

    Ok(Json(WebhookAck {
        result: outcome.as_str(),
    }))
}
