//! Native token endpoints.

use axum::Json;
use axum::extract::{Extension, State};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::middleware::auth::AuthenticatedCaller;
use crate::models::{LogoutResponse, PasswordGrantRequest, RefreshGrantRequest, TokenResponse};
use crate::services::gateway::{GrantOrigin, PasswordGrant};

/// `POST /token`: password grant.
pub async fn token_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PasswordGrantRequest>,
) -> AppResult<Json<TokenResponse>> {
    let grant = PasswordGrant {
        email: &body.email,
        password: &body.password,
        client_id: &body.client_id,
        scopes: body.scopes.as_deref(),
        mfa_code: body.mfa_code.as_deref(),
    };
    let resp = state
        .gateway
        .password_grant(grant, GrantOrigin::Native)
        .await?;
    Ok(Json(resp))
}

/// `POST /token/refresh`: rotate a refresh token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshGrantRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = state
        .gateway
        .refresh_grant(
            &body.refresh_token,
            body.client_id.as_deref(),
            GrantOrigin::Native,
        )
        .await?;
    Ok(Json(resp))
}

/// `POST /logout`: revoke the caller's own session.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedCaller(claims)): Extension<AuthenticatedCaller>,
) -> AppResult<Json<LogoutResponse>> {
    let revoked = state.gateway.logout(&claims).await?;
    Ok(Json(LogoutResponse { revoked }))
}
