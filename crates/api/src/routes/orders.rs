//! Order placement, lookup and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use domain::{Order, OrderItem, OrderStatus, PaymentMethod};
use saga::{OrderOrchestrator, OrderReceipt, OrderService, PlaceOrderRequest, SagaError};
use serde::{Deserialize, Serialize};

use crate::DynOrderStore;
use crate::error::ApiError;

/// Shared state of the order service handlers.
pub struct OrderAppState {
    pub orchestrator: OrderOrchestrator<DynOrderStore>,
}

impl OrderAppState {
    pub fn new(orchestrator: OrderOrchestrator<DynOrderStore>) -> Self {
        Self { orchestrator }
    }

    pub fn orders(&self) -> &OrderService<DynOrderStore> {
        self.orchestrator.orders()
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderBody {
    pub items: Vec<OrderItemBody>,
    pub shipping_address: String,
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct OrderItemBody {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct StatusUpdateBody {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    pub status: &'static str,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub shipping_address: String,
    pub payment_method: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct PlacedOrderResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(Serialize)]
pub struct OrderCountResponse {
    pub user_id: i64,
    pub count: u64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().as_i64(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id().as_i64(),
            status: order.status().as_str(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total_amount().cents(),
            shipping_address: order.shipping_address().to_string(),
            payment_method: order.payment_method().as_str(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            expires_at: order.expires_at(),
        }
    }
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.as_i64(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            subtotal_cents: item.subtotal().map(|m| m.cents()),
        }
    }
}

impl From<OrderReceipt> for PlacedOrderResponse {
    fn from(receipt: OrderReceipt) -> Self {
        Self {
            order: OrderResponse::from(&receipt.order),
            customer_name: receipt.customer_name,
            customer_email: receipt.customer_email,
        }
    }
}

fn list_response(orders: Vec<Order>) -> Json<Vec<OrderResponse>> {
    Json(orders.iter().map(OrderResponse::from).collect())
}

/// Extracts the token from an `Authorization: Bearer ...` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

// -- Handlers --

/// POST /api/orders/place — place an order for the authenticated caller.
///
/// Responds 201 with the order `PENDING` (payment requested) or `CANCELLED`
/// (payment request failed and was compensated).
#[tracing::instrument(skip_all)]
pub async fn place(
    State(state): State<Arc<OrderAppState>>,
    headers: HeaderMap,
    body: Result<Json<PlaceOrderBody>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>), ApiError> {
    let token = bearer_token(&headers)?;
    let Json(body) = body?;

    let payment_method = body
        .payment_method
        .parse::<PaymentMethod>()
        .map_err(SagaError::from)?;
    let items = body
        .items
        .into_iter()
        .map(|item| {
            OrderItem::new(
                item.product_id,
                item.product_name,
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
        .collect();

    let receipt = state
        .orchestrator
        .place_order(
            token,
            PlaceOrderRequest {
                items,
                shipping_address: body.shipping_address,
                payment_method,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// GET /api/orders — list every order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<OrderAppState>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    Ok(list_response(state.orders().list_all().await?))
}

/// GET /api/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<OrderAppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders().get(OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /api/orders/number/{order_number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number(
    State(state): State<Arc<OrderAppState>>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders().find_by_order_number(&order_number).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /api/orders/user/{user_id}
#[tracing::instrument(skip(state))]
pub async fn list_by_user(
    State(state): State<Arc<OrderAppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    Ok(list_response(
        state.orders().find_by_user(UserId::new(user_id)).await?,
    ))
}

/// GET /api/orders/user/{user_id}/count
#[tracing::instrument(skip(state))]
pub async fn count_by_user(
    State(state): State<Arc<OrderAppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<OrderCountResponse>, ApiError> {
    let count = state.orders().count_by_user(UserId::new(user_id)).await?;
    Ok(Json(OrderCountResponse { user_id, count }))
}

/// GET /api/orders/status/{status}
#[tracing::instrument(skip(state))]
pub async fn list_by_status(
    State(state): State<Arc<OrderAppState>>,
    Path(status): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let status = parse_status(&status)?;
    Ok(list_response(state.orders().find_by_status(status).await?))
}

/// PUT /api/orders/{id}/status — administrative status change.
///
/// Moving a resolved order is a no-op and still answers 200 with the
/// unchanged order.
#[tracing::instrument(skip(state, body))]
pub async fn update_status(
    State(state): State<Arc<OrderAppState>>,
    Path(id): Path<i64>,
    body: Result<Json<StatusUpdateBody>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(body) = body?;
    let status = parse_status(&body.status)?;
    let id = OrderId::new(id);

    state.orders().update_status(id, status).await?;
    let order = state.orders().get(id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /api/orders/{id} — administrative delete.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<OrderAppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.orders().delete(OrderId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
