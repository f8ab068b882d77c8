//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, PaymentError};
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or rejected credentials.
    Unauthorized(String),
    /// Saga operation error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::Domain(DomainError::Payment(
            PaymentError::InvalidStateTransition { .. }
            | PaymentError::StatusChangeNotAllowed { .. },
        )) => StatusCode::CONFLICT,
        SagaError::Domain(_) => StatusCode::BAD_REQUEST,
        SagaError::OrderNotFound(_)
        | SagaError::OrderNumberNotFound(_)
        | SagaError::PaymentNotFound(_)
        | SagaError::NoPaymentForOrder(_)
        | SagaError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        SagaError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        SagaError::Store(StoreError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
        SagaError::UpstreamUnavailable(_) | SagaError::PaymentRejected(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
