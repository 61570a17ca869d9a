//! API-key authentication.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::routes::ApiState;

pub const API_KEY_HEADER: &str = "apiKey";

/// Reject any request whose `apiKey` header does not match a configured
/// key.
pub async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if state.api_keys.iter().any(|k| k == key) => Ok(next.run(request).await),
        _ => Err(ApiError::Auth),
    }
}
