//! API error mapping.
//!
//! One conversion point from the metadata layer's errors to HTTP statuses.
//! Internal failures are logged and answered with an opaque body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use chainlens_metadata::MetadataError;

#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid API key.
    Auth,
    /// Unknown or hidden path — indistinguishable on the wire.
    NotFound,
    /// Bad query: unknown attribute, wrong operator, type mismatch.
    Validation(String),
    /// Everything else.
    Internal(String),
}

impl From<MetadataError> for ApiError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound => Self::NotFound,
            MetadataError::QueryValidation(msg) => Self::Validation(msg),
            MetadataError::Source(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Auth => (
                StatusCode::UNAUTHORIZED,
                json!({"message": "missing or invalid apiKey"}),
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, json!({"message": "not found"})),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, json!({"message": msg})),
            Self::Internal(msg) => {
                error!(error = msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"message": "serverResource failed"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
