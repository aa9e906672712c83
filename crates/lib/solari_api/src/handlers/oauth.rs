//! OAuth-shaped endpoints: form token grant, userinfo, JWKS and discovery.

use axum::Json;
use axum::extract::{Extension, State};
use solari_core::auth::AuthError;
use solari_core::auth::jwt::JwkSet;
use solari_core::auth::scopes::parse_scope_param;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::ApiForm;
use crate::middleware::auth::AuthenticatedCaller;
use crate::models::{DiscoveryDocument, OAuthTokenForm, TokenResponse, UserInfoResponse};
use crate::services::gateway::{GrantOrigin, PasswordGrant};

pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// `POST /oauth/token`: `grant_type=password` or `grant_type=refresh_token`.
pub async fn token_handler(
    State(state): State<AppState>,
    ApiForm(form): ApiForm<OAuthTokenForm>,
) -> AppResult<Json<TokenResponse>> {
    let resp = match form.grant_type.as_str() {
        GRANT_PASSWORD => {
            let scopes = parse_scope_param(form.scope.as_deref());
            let grant = PasswordGrant {
                email: form.username.as_deref().unwrap_or_default(),
                password: form.password.as_deref().unwrap_or_default(),
                client_id: form.client_id.as_deref().unwrap_or_default(),
                scopes: scopes.as_deref(),
                mfa_code: form.mfa_code.as_deref(),
            };
            state
                .gateway
                .password_grant(grant, GrantOrigin::OAuth)
                .await?
        }
        GRANT_REFRESH_TOKEN => {
            state
                .gateway
                .refresh_grant(
                    form.refresh_token.as_deref().unwrap_or_default(),
                    form.client_id.as_deref(),
                    GrantOrigin::OAuth,
                )
                .await?
        }
        "" => return Err(AppError::invalid_request("grant_type is required")),
        other => {
            return Err(AppError(AuthError::InvalidRequest(format!(
                "unsupported grant_type '{other}'"
            ))));
        }
    };
    Ok(Json(resp))
}

/// `GET /oauth/userinfo`
pub async fn userinfo_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedCaller(claims)): Extension<AuthenticatedCaller>,
) -> Json<UserInfoResponse> {
    Json(state.gateway.userinfo(&claims).await)
}

/// `GET /oauth/jwks` and `GET /.well-known/jwks.json`
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.gateway.signer().jwks().clone())
}

/// `GET /.well-known/openid-configuration`
pub async fn discovery_handler(State(state): State<AppState>) -> Json<DiscoveryDocument> {
    let issuer = state.gateway.signer().issuer().trim_end_matches('/').to_string();
    Json(DiscoveryDocument {
        token_endpoint: format!("{issuer}/oauth/token"),
        userinfo_endpoint: format!("{issuer}/oauth/userinfo"),
        jwks_uri: format!("{issuer}/oauth/jwks"),
        grant_types_supported: vec![GRANT_PASSWORD.into(), GRANT_REFRESH_TOKEN.into()],
        response_types_supported: vec!["token".into()],
        token_endpoint_auth_methods_supported: vec!["none".into()],
        id_token_signing_alg_values_supported: vec![
            state.gateway.signer().algorithm_name().into(),
        ],
        issuer,
    })
}
