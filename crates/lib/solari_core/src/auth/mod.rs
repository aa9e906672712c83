//! Authentication and authorization logic.
//!
//! Provides credential verification, scope resolution and access-token
//! signing shared by the gateway in `solari_api`.

pub mod credentials;
pub mod jwt;
pub mod scopes;

use thiserror::Error;

use crate::session::StoreError;

/// Classified authentication errors.
///
/// Every variant except `Store` and `Internal` is a local, user-facing
/// condition with a stable machine-readable [`code`](AuthError::code).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Multi-factor code required")]
    MfaRequired,

    #[error("Invalid multi-factor code")]
    InvalidMfaCode,

    #[error("Unknown client")]
    UnknownClient,

    #[error("No scopes available for this client")]
    NoScopesForClient,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient scope: {0} required")]
    InsufficientScope(String),

    #[error("Unknown user")]
    UnknownUser,

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::MfaRequired => "mfa_required",
            AuthError::InvalidMfaCode => "invalid_mfa_code",
            AuthError::UnknownClient => "unknown_client",
            AuthError::NoScopesForClient => "no_scopes_for_client",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::InvalidSession => "invalid_session",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InsufficientScope(_) => "insufficient_scope",
            AuthError::UnknownUser => "unknown_user",
            AuthError::Store(StoreError::MissingSession) => "invalid_session",
            AuthError::Store(_) => "storage_unavailable",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case_and_stable() {
        assert_eq!(AuthError::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(AuthError::NoScopesForClient.code(), "no_scopes_for_client");
        assert_eq!(
            AuthError::InsufficientScope("admin".into()).code(),
            "insufficient_scope"
        );
        assert_eq!(
            AuthError::Store(StoreError::MissingSession).code(),
            "invalid_session"
        );
        assert_eq!(
            AuthError::Store(StoreError::Timeout(std::time::Duration::from_secs(5))).code(),
            "storage_unavailable"
        );
    }
}
