//! Application error types.

use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use solari_core::auth::AuthError;
use solari_core::session::StoreError;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Gateway errors with HTTP status mapping.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct AppError(#[from] pub AuthError);

impl AppError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        AppError(AuthError::InvalidRequest(message.into()))
    }

    pub fn code(&self) -> &'static str {
        self.0.code()
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AuthError::InvalidRequest(_) | AuthError::UnknownClient => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::MfaRequired
            | AuthError::InvalidMfaCode
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidSession
            | AuthError::InvalidToken
            | AuthError::Store(StoreError::MissingSession) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientScope(_) | AuthError::NoScopesForClient => {
                StatusCode::FORBIDDEN
            }
            AuthError::UnknownUser => StatusCode::NOT_FOUND,
            AuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            AuthError::Store(StoreError::MissingSession) => self.0.to_string(),
            AuthError::Store(e) => {
                warn!("session store failure: {e}");
                "Session store unavailable".to_string()
            }
            AuthError::Internal(e) => {
                error!("internal error: {e}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError(AuthError::Store(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid_request(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::invalid_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn statuses_follow_error_class() {
        let cases = [
            (AuthError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (AuthError::UnknownClient, StatusCode::BAD_REQUEST),
            (AuthError::MfaRequired, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::NoScopesForClient, StatusCode::FORBIDDEN),
            (
                AuthError::InsufficientScope("admin".into()),
                StatusCode::FORBIDDEN,
            ),
            (AuthError::UnknownUser, StatusCode::NOT_FOUND),
            (
                AuthError::Store(StoreError::Timeout(Duration::from_secs(1))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuthError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError(err).status(), status);
        }
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let resp = AppError(AuthError::Internal("db password is hunter2".into())).into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["message"], "Internal server error");
    }
}
