//! Request authentication.
//!
//! Two layers: an optional shared bearer token gating the whole API
//! (disabled when no `api_token` is configured, for local trusted loopback
//! use), and a caller identity carried in the `x-user-id` header. Every
//! callable operation requires an identity.

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::AppContext;

pub const USER_HEADER: &str = "x-user-id";

/// Authenticate the request and return the caller's user id.
pub fn require_user(ctx: &AppContext, headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(expected) = &ctx.config.api_token {
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            return Err(ApiError::Unauthenticated);
        }
    }

    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthenticated)
}
