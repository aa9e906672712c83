//! # solari_api
//!
//! HTTP auth gateway for Solari.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, health, oauth, permissions};
use crate::services::gateway::AuthGateway;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthGateway>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
///
/// Delegates to `solari_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    solari_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/token", post(auth::token_handler))
        .route("/token/refresh", post(auth::refresh_handler))
        .route("/oauth/token", post(oauth::token_handler))
        .route("/oauth/jwks", get(oauth::jwks_handler))
        .route("/.well-known/jwks.json", get(oauth::jwks_handler))
        .route(
            "/.well-known/openid-configuration",
            get(oauth::discovery_handler),
        );

    // Any valid bearer credential
    let authenticated = Router::new()
        .route("/oauth/userinfo", get(oauth::userinfo_handler))
        .route("/logout", post(auth::logout_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Bearer credential carrying the admin scope
    let admin = Router::new()
        .route("/session/revoke", post(admin::revoke_session_handler))
        .route("/sessions", get(admin::list_sessions_handler))
        .route("/sessions/cleanup", post(admin::cleanup_handler))
        .route("/audit/summary", get(admin::audit_summary_handler))
        .route(
            "/permissions/stream",
            get(permissions::stream_permissions_handler),
        )
        .route(
            "/permissions/update",
            post(permissions::update_permissions_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
