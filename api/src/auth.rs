//! Request authentication middleware

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Data routes: the `x-api-key` header must name a configured frontend key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let Some(key) = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!(%path, "API access denied: missing API key");
        return Err(ApiError::Unauthorized("Missing API key".to_string()));
    };
    if !state.config.api_keys.iter().any(|k| k == key) {
        tracing::warn!(%path, "API access denied: invalid API key");
        return Err(ApiError::Unauthorized("Invalid API key".to_string()));
    }

    tracing::debug!(%path, key_prefix = %key.chars().take(8).collect::<String>(), "API access granted");
    Ok(next.run(request).await)
}

/// Compare two secrets in time independent of where they differ.
///
/// Both sides are hashed first so the loop always runs over 32 bytes,
/// whatever the lengths of the inputs.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented.iter().zip(expected.iter()).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}

/// Admin routes: `Authorization: Bearer <ADMIN_TOKEN>`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        tracing::warn!("admin access denied: no admin token configured");
        return Err(ApiError::Unauthorized("Admin access is disabled".to_string()));
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let denied = match presented {
        Some(token) if tokens_match(token, expected) => None,
        Some(_) => Some("Invalid token"),
        None => Some("Access token required"),
    };
    if let Some(reason) = denied {
        tracing::warn!(path = %request.uri().path(), reason, "admin access denied");
        return Err(ApiError::Unauthorized(reason.to_string()));
    }
    Ok(next.run(request).await)
}
