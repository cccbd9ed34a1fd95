//! Maps `tyr_types::TyrError` onto HTTP status codes for request handlers
//! (spec.md §7's propagation policy: "inside request handlers, errors are
//! surfaced to the client").
//!
//! `TyrError` lives in `tyr-types`, which has no `axum` dependency, so the
//! `IntoResponse` impl lives here behind a thin newtype instead of directly
//! on `TyrError` (Rust's orphan rules forbid implementing a foreign trait
//! for a foreign type).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tyr_types::TyrError;

pub struct ApiError(pub TyrError);

impl From<TyrError> for ApiError {
    fn from(err: TyrError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(TyrError::TransientBackend(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            TyrError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TyrError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            TyrError::Conflict(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            TyrError::TransientBackend(err) => {
                tracing::error!(error = %err, "transient backend error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
