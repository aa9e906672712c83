//! Session and refresh-token persistence.
//!
//! The session store is the only component that talks to durable storage.
//! Two backends implement [`SessionStore`]:
//! - [`postgres::PgSessionStore`]: the production backend.
//! - [`memory::InMemorySessionStore`]: tests and local development.
//!
//! Both backends honour the same contract:
//! - lookups never return an expired row; they delete it instead;
//! - deleting a session deletes every refresh token it owns in the same
//!   unit of work;
//! - rotating a refresh token is exclusive per token: of two concurrent
//!   rotations of one token, exactly one succeeds;
//! - every write reports failure through `StoreError`, never a silent no-op.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::auth::{NewSession, RefreshToken, Session, SessionRefresh};

/// Session ID length (alphanumeric chars, ~190 bits).
const SESSION_ID_LEN: usize = 32;

/// Refresh token length (alphanumeric chars, ~380 bits). Refresh tokens are
/// long-lived bearer secrets, so they carry twice the entropy of session IDs.
const REFRESH_TOKEN_LEN: usize = 64;

/// Default refresh token and session lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Default bound on a single durable-storage call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Session does not exist or has expired")]
    MissingSession,

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lifetimes applied by the store when it stamps `expires_at`.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub session_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

impl SessionPolicy {
    /// Sessions and their refresh tokens share one lifetime.
    pub fn from_refresh_ttl_secs(secs: i64) -> Self {
        Self {
            session_ttl: chrono::Duration::seconds(secs),
            refresh_ttl: chrono::Duration::seconds(secs),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_refresh_ttl_secs(DEFAULT_REFRESH_TTL_SECS)
    }
}

/// Rows removed by an expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub sessions_deleted: u64,
    pub tokens_deleted: u64,
}

/// Successful rotation: the re-stamped session and its new refresh token.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub session: Session,
    pub refresh_token: RefreshToken,
}

/// Result of [`SessionStore::rotate_refresh_token`].
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    Rotated(Rotation),
    /// Token unknown, expired, or already rotated by someone else.
    UnknownToken,
    /// Token consumed, but its session is gone or expired.
    SessionGone,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session>;
    /// Returns `None` for unknown or expired sessions; expired ones are deleted.
    async fn get_session(&self, session_id: &str) -> StoreResult<Option<Session>>;
    /// Deletes the session and all of its refresh tokens together.
    async fn delete_session(&self, session_id: &str) -> StoreResult<bool>;

    /// Fails with `MissingSession` unless the session is live.
    async fn create_refresh_token(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> StoreResult<RefreshToken>;
    /// Returns `None` for unknown or expired tokens; expired ones are deleted.
    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>>;
    async fn delete_refresh_token(&self, token: &str) -> StoreResult<bool>;
    async fn delete_refresh_tokens_for_session(&self, session_id: &str) -> StoreResult<bool>;

    /// Consume `token`, re-stamp its session and issue a successor, atomically.
    async fn rotate_refresh_token(
        &self,
        token: &str,
        refresh: SessionRefresh,
    ) -> StoreResult<RotationOutcome>;

    /// Live sessions of one user, most recent first.
    async fn get_user_sessions(&self, user_id: &str) -> StoreResult<Vec<Session>>;
    /// All live sessions, most recent first.
    async fn list_sessions(&self) -> StoreResult<Vec<Session>>;
    async fn cleanup_expired(&self) -> StoreResult<CleanupReport>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

fn random_alphanumeric(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate an opaque session ID.
pub(crate) fn generate_session_id() -> String {
    random_alphanumeric(SESSION_ID_LEN)
}

/// Generate a cryptographically random refresh token.
pub(crate) fn generate_refresh_token() -> String {
    random_alphanumeric(REFRESH_TOKEN_LEN)
}

/// SHA-256 hash a refresh token for storage.
pub(crate) fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_longer_than_session_ids() {
        let sid = generate_session_id();
        let rt = generate_refresh_token();
        assert_eq!(sid.len(), SESSION_ID_LEN);
        assert_eq!(rt.len(), REFRESH_TOKEN_LEN);
        assert!(rt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_refresh_token(), rt);
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        let h = hash_refresh_token("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
