//! Payment creation, processing, lookup and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, UserId};
use domain::{Payment, PaymentStatus};
use saga::CreatePaymentRequest;
use serde::{Deserialize, Serialize};

use crate::DynPaymentProcessor;
use crate::error::ApiError;

/// Shared state of the payment service handlers.
pub struct PaymentAppState {
    pub processor: Arc<DynPaymentProcessor>,
}

impl PaymentAppState {
    pub fn new(processor: Arc<DynPaymentProcessor>) -> Self {
        Self { processor }
    }
}

#[derive(Deserialize)]
pub struct StatusUpdateBody {
    pub status: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: i64,
    pub reference: String,
    pub order_id: i64,
    pub user_id: i64,
    pub amount_cents: i64,
    pub method: &'static str,
    pub status: &'static str,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id().as_i64(),
            reference: payment.reference().to_string(),
            order_id: payment.order_id().as_i64(),
            user_id: payment.user_id().as_i64(),
            amount_cents: payment.amount().cents(),
            method: payment.method().as_str(),
            status: payment.status().as_str(),
            transaction_id: payment.transaction_id().map(String::from),
            gateway_response: payment.gateway_response().map(String::from),
            created_at: payment.created_at(),
            processed_at: payment.processed_at(),
        }
    }
}

fn list_response(payments: Vec<Payment>) -> Json<Vec<PaymentResponse>> {
    Json(payments.iter().map(PaymentResponse::from).collect())
}

fn parse_status(raw: &str) -> Result<PaymentStatus, ApiError> {
    raw.parse::<PaymentStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// POST /api/payments/create-for-order — called by the order service.
///
/// Stores a `PENDING` payment, schedules its processing and answers 201
/// without waiting for the gateway. Repeating the call for the same order
/// returns the existing payment.
#[tracing::instrument(skip_all)]
pub async fn create_for_order(
    State(state): State<Arc<PaymentAppState>>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let Json(request) = body?;
    let payment = state.processor.submit_for_order(request).await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse::from(&payment))))
}

/// POST /api/payments/void-for-order — compensation called by the order service.
///
/// Cancels or refunds the payment of an order whose placement failed, or
/// stores a cancelled one if none exists yet so a late create charges nothing.
#[tracing::instrument(skip_all)]
pub async fn void_for_order(
    State(state): State<Arc<PaymentAppState>>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let Json(request) = body?;
    let payment = state.processor.void_for_order(request).await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// POST /api/payments/{id}/process — run the gateway now.
///
/// A payment that is already terminal is returned unchanged.
#[tracing::instrument(skip(state))]
pub async fn process(
    State(state): State<Arc<PaymentAppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.processor.process(PaymentId::new(id)).await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// GET /api/payments
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<PaymentAppState>>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    Ok(list_response(state.processor.list_all().await?))
}

/// GET /api/payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<PaymentAppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.processor.get(PaymentId::new(id)).await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// GET /api/payments/order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn get_by_order(
    State(state): State<Arc<PaymentAppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .processor
        .find_by_order(OrderId::new(order_id))
        .await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// GET /api/payments/user/{user_id}
#[tracing::instrument(skip(state))]
pub async fn list_by_user(
    State(state): State<Arc<PaymentAppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    Ok(list_response(
        state.processor.find_by_user(UserId::new(user_id)).await?,
    ))
}

/// GET /api/payments/status/{status}
#[tracing::instrument(skip(state))]
pub async fn list_by_status(
    State(state): State<Arc<PaymentAppState>>,
    Path(status): Path<String>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let status = parse_status(&status)?;
    Ok(list_response(state.processor.find_by_status(status).await?))
}

/// PUT /api/payments/{id}/status — administrative status override.
///
/// Changes the transition table forbids answer 409.
#[tracing::instrument(skip(state, body))]
pub async fn update_status(
    State(state): State<Arc<PaymentAppState>>,
    Path(id): Path<i64>,
    body: Result<Json<StatusUpdateBody>, JsonRejection>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let Json(body) = body?;
    let status = parse_status(&body.status)?;
    let payment = state
        .processor
        .update_status(PaymentId::new(id), status)
        .await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// DELETE /api/payments/{id} — administrative delete.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<PaymentAppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.processor.delete(PaymentId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
