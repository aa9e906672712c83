//! Authentication middleware: Bearer token extraction and verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use solari_core::auth::AuthError;
use solari_core::models::auth::{ADMIN_SCOPE, AccessClaims};

use crate::AppState;
use crate::error::AppError;

/// Verified claims of the caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub AccessClaims);

fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError(AuthError::InvalidToken))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError(AuthError::InvalidToken))?;
    Ok(token)
}

/// Axum middleware: verifies `Authorization: Bearer <token>` and injects
/// [`AuthenticatedCaller`]. The session store is not consulted.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.gateway.verify_bearer(bearer_token(&request)?)?;
    request.extensions_mut().insert(AuthenticatedCaller(claims));
    Ok(next.run(request).await)
}

/// Like [`require_auth`], and additionally requires the `admin` scope.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.gateway.verify_bearer(bearer_token(&request)?)?;
    if !claims.has_scope(ADMIN_SCOPE) {
        return Err(AppError(AuthError::InsufficientScope(ADMIN_SCOPE.into())));
    }
    request.extensions_mut().insert(AuthenticatedCaller(claims));
    Ok(next.run(request).await)
}
