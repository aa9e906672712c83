//! Request and response shapes for the HTTP surface.
//!
//! Token responses use OAuth field names (`snake_case`). Native request bodies
//! also accept the camelCase spellings older clients send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solari_core::models::auth::{Entitlements, RiskState, Session};

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// `POST /token`
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordGrantRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "clientId")]
    pub client_id: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default, alias = "mfaCode")]
    pub mfa_code: Option<String>,
}

/// `POST /token/refresh`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshGrantRequest {
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
}

/// `POST /oauth/token` form body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthTokenForm {
    #[serde(default)]
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    /// Space-separated scope list.
    pub scope: Option<String>,
    pub mfa_code: Option<String>,
    pub refresh_token: Option<String>,
}

/// Access credential response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub aud: String,
    pub scp: Vec<String>,
    pub sid: String,
}

/// `POST /session/revoke`
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeSessionRequest {
    #[serde(default, alias = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub revoked: bool,
    pub session_id: String,
}

/// `GET /sessions` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionsQuery {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            client_id: s.client_id,
            scopes: s.scopes,
            risk: s.risk,
            entitlements: s.entitlements,
            created_at: s.created_at,
            expires_at: s.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionView>,
}

/// `POST /permissions/update` response: the user's grants after the update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
    /// Observers that received the change event.
    pub notified: usize,
}

/// `GET /audit/summary` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditSummaryQuery {
    pub limit: Option<usize>,
}

/// `GET /oauth/userinfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: String,
    pub scp: Vec<String>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
    pub sid: String,
}

/// `GET /.well-known/openid-configuration`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub grant_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub store_reachable: bool,
    pub store_durable: bool,
    pub signing_alg: String,
}
