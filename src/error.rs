//! Pipeline error kinds and their HTTP representation.
//!
//! Recoverable errors (rate limit, invalid payment, no upstream route) are
//! returned as structured responses; everything else collapses to an opaque
//! 500. No variant here carries a secret plaintext, a raw facilitator
//! transport error, or an internal upstream address -- those are logged,
//! not surfaced.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unknown tenant, unknown endpoint, inactive endpoint, or reserved
    /// slug -- deliberately indistinguishable to the caller.
    #[error("not found")]
    NotFound,

    /// Endpoint has no resolvable recipient address.
    #[error("endpoint is misconfigured: {0}")]
    Misconfigured(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("payment verification failed: {reason}")]
    PaymentInvalid { reason: String },

    #[error("upstream unreachable")]
    UpstreamUnreachable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        AppError::Internal(source.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
            }
            AppError::Misconfigured(reason) => {
                tracing::error!(reason, "endpoint misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                )
                    .into_response()
            }
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after_secs.to_string())],
                Json(json!({
                    "error": "rate limited",
                    "message": "too many requests",
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response(),
            AppError::PaymentInvalid { reason } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({"error": "Payment verification failed", "reason": reason})),
            )
                .into_response(),
            AppError::UpstreamUnreachable => (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "upstream unreachable"})),
            )
                .into_response(),
            AppError::Internal(reason) => {
                tracing::error!(error = %reason, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}
