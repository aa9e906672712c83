//! Administrative session and audit endpoints. All require the `admin` scope.

use axum::Json;
use axum::extract::{Extension, State};
use solari_core::models::audit::AuditSummary;
use solari_core::session::CleanupReport;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::auth::AuthenticatedCaller;
use crate::models::{
    AuditSummaryQuery, RevokeResponse, RevokeSessionRequest, SessionView, SessionsQuery,
    SessionsResponse,
};

/// Upper bound on `limit` for `/audit/summary`.
const MAX_AUDIT_LIMIT: usize = 500;

/// `POST /session/revoke`
pub async fn revoke_session_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedCaller(actor)): Extension<AuthenticatedCaller>,
    ApiJson(body): ApiJson<RevokeSessionRequest>,
) -> AppResult<Json<RevokeResponse>> {
    let revoked = state
        .gateway
        .revoke_session(&body.session_id, &actor)
        .await?;
    Ok(Json(RevokeResponse {
        revoked,
        session_id: body.session_id,
    }))
}

/// `GET /sessions`: live sessions, optionally for one `user_id`.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SessionsQuery>,
) -> AppResult<Json<SessionsResponse>> {
    let sessions = state
        .gateway
        .list_sessions(query.user_id.as_deref())
        .await?;
    Ok(Json(SessionsResponse {
        sessions: sessions.into_iter().map(SessionView::from).collect(),
    }))
}

/// `POST /sessions/cleanup`: run the expiry sweep now.
pub async fn cleanup_handler(State(state): State<AppState>) -> AppResult<Json<CleanupReport>> {
    Ok(Json(state.gateway.cleanup_expired().await?))
}

/// `GET /audit/summary`
pub async fn audit_summary_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditSummaryQuery>,
) -> AppResult<Json<AuditSummary>> {
    let limit = query
        .limit
        .unwrap_or(state.config.audit_recent_limit)
        .min(MAX_AUDIT_LIMIT);
    Ok(Json(state.gateway.audit_summary(limit).await?))
}
