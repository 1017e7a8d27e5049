use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::token::{Payload, TokenMaker};
use crate::gateway::{
    state::AppState,
    types::{ApiError, error_codes},
};

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::unauthorized(error_codes::MISSING_AUTH, "Missing Authorization header")
        })?
        .to_str()
        .map_err(|_| ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid token format"))?;

    let mut parts = value.split_whitespace();
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ApiError::unauthorized(
            error_codes::AUTH_FAILED,
            "Invalid token format",
        ));
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::unauthorized(
            error_codes::AUTH_FAILED,
            format!("Unsupported authorization type {}", scheme),
        ));
    }
    Ok(token)
}

/// Verify the bearer token and expose its [`Payload`] to handlers
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let payload = authenticate(state.tokens().as_ref(), request.headers())?;
    request.extensions_mut().insert(payload);
    Ok(next.run(request).await)
}

fn authenticate(tokens: &dyn TokenMaker, headers: &HeaderMap) -> Result<Payload, ApiError> {
    let token = bearer_token(headers)?;
    tokens.verify_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid or expired token")
    })
}
