//! Postgres-backed session store.
//!
//! Sessions live in `sessions`; refresh tokens in `refresh_tokens`, keyed by
//! the SHA-256 of the plaintext and tied to their session with
//! `ON DELETE CASCADE`. Expiry is judged against application time so both
//! backends agree on what "expired" means.
//!
//! Every call is bounded by the configured operation timeout. Compound
//! operations run inside a single transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::{
    CleanupReport, Rotation, RotationOutcome, SessionPolicy, SessionStore, StoreError,
    StoreResult, generate_refresh_token, generate_session_id, hash_refresh_token,
};
use crate::models::auth::{Entitlements, NewSession, RefreshToken, Session, SessionRefresh};

const SESSION_COLUMNS: &str =
    "id, user_id, client_id, scopes, requested_scopes, risk, entitlements, created_at, expires_at";

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    client_id: String,
    scopes: Vec<String>,
    requested_scopes: Option<Vec<String>>,
    risk: String,
    entitlements: Json<Entitlements>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let risk = row
            .risk
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("session {}: {e}", row.id)))?;
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            client_id: row.client_id,
            scopes: row.scopes,
            requested_scopes: row.requested_scopes,
            risk,
            entitlements: row.entitlements.0,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RefreshTokenRow {
    session_id: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// Durable session store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
    policy: SessionPolicy,
    op_timeout: Duration,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, policy: SessionPolicy, op_timeout: Duration) -> Self {
        Self {
            pool,
            policy,
            op_timeout,
        }
    }

    /// Run one storage call under the operation timeout.
    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }

    fn sessions_from_rows(rows: Vec<SessionRow>) -> StoreResult<Vec<Session>> {
        rows.into_iter().map(Session::try_from).collect()
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        self.bounded(async {
            let now = Utc::now();
            let row = sqlx::query_as::<_, SessionRow>(&format!(
                "INSERT INTO sessions (id, user_id, client_id, scopes, requested_scopes, risk, entitlements, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {SESSION_COLUMNS}"
            ))
            .bind(generate_session_id())
            .bind(&new.user_id)
            .bind(&new.client_id)
            .bind(&new.scopes)
            .bind(&new.requested_scopes)
            .bind(new.risk.as_str())
            .bind(Json(&new.entitlements))
            .bind(now)
            .bind(now + self.policy.session_ttl)
            .fetch_one(&self.pool)
            .await?;
            Session::try_from(row)
        })
        .await
    }

    async fn get_session(&self, session_id: &str) -> StoreResult<Option<Session>> {
        self.bounded(async {
            let Some(row) = sqlx::query_as::<_, SessionRow>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
            ))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            else {
                return Ok(None);
            };
            let now = Utc::now();
            if row.expires_at <= now {
                sqlx::query("DELETE FROM sessions WHERE id = $1 AND expires_at <= $2")
                    .bind(session_id)
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
                debug!(session_id, "expired session removed on lookup");
                return Ok(None);
            }
            Session::try_from(row).map(Some)
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<bool> {
        self.bounded(async {
            // refresh_tokens cascade with the session row.
            let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn create_refresh_token(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> StoreResult<RefreshToken> {
        self.bounded(async {
            let now = Utc::now();
            let plaintext = generate_refresh_token();
            let expires_at = now + self.policy.refresh_ttl;
            let result = sqlx::query(
                "INSERT INTO refresh_tokens (token_hash, session_id, user_id, created_at, expires_at) \
                 SELECT $1, id, $3, $4, $5 FROM sessions WHERE id = $2 AND expires_at > $4",
            )
            .bind(hash_refresh_token(&plaintext))
            .bind(session_id)
            .bind(user_id)
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::MissingSession);
            }
            Ok(RefreshToken {
                id: plaintext,
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                expires_at,
            })
        })
        .await
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        self.bounded(async {
            let hash = hash_refresh_token(token);
            let Some(row) = sqlx::query_as::<_, RefreshTokenRow>(
                "SELECT session_id, user_id, expires_at FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?
            else {
                return Ok(None);
            };
            if row.expires_at <= Utc::now() {
                sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
                    .bind(&hash)
                    .execute(&self.pool)
                    .await?;
                return Ok(None);
            }
            Ok(Some(RefreshToken {
                id: token.to_string(),
                session_id: row.session_id,
                user_id: row.user_id,
                expires_at: row.expires_at,
            }))
        })
        .await
    }

    async fn delete_refresh_token(&self, token: &str) -> StoreResult<bool> {
        self.bounded(async {
            let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
                .bind(hash_refresh_token(token))
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn delete_refresh_tokens_for_session(&self, session_id: &str) -> StoreResult<bool> {
        self.bounded(async {
            let result = sqlx::query("DELETE FROM refresh_tokens WHERE session_id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn rotate_refresh_token(
        &self,
        token: &str,
        refresh: SessionRefresh,
    ) -> StoreResult<RotationOutcome> {
        self.bounded(async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;

            // The DELETE row lock makes the token single-use: a concurrent
            // rotation blocks here and then finds nothing.
            let Some(old) = sqlx::query_as::<_, RefreshTokenRow>(
                "DELETE FROM refresh_tokens WHERE token_hash = $1 AND expires_at > $2 \
                 RETURNING session_id, user_id, expires_at",
            )
            .bind(hash_refresh_token(token))
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            else {
                tx.rollback().await?;
                return Ok(RotationOutcome::UnknownToken);
            };

            let Some(row) = sqlx::query_as::<_, SessionRow>(&format!(
                "UPDATE sessions SET scopes = $2, risk = $3, entitlements = $4, expires_at = $5 \
                 WHERE id = $1 AND expires_at > $6 RETURNING {SESSION_COLUMNS}"
            ))
            .bind(&old.session_id)
            .bind(&refresh.scopes)
            .bind(refresh.risk.as_str())
            .bind(Json(&refresh.entitlements))
            .bind(now + self.policy.session_ttl)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            else {
                // Keep the consumed token deleted.
                tx.commit().await?;
                return Ok(RotationOutcome::SessionGone);
            };
            let session = Session::try_from(row)?;

            let plaintext = generate_refresh_token();
            let expires_at = now + self.policy.refresh_ttl;
            sqlx::query(
                "INSERT INTO refresh_tokens (token_hash, session_id, user_id, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(hash_refresh_token(&plaintext))
            .bind(&session.id)
            .bind(&old.user_id)
            .bind(now)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            let refresh_token = RefreshToken {
                id: plaintext,
                session_id: session.id.clone(),
                user_id: old.user_id,
                expires_at,
            };
            Ok(RotationOutcome::Rotated(Rotation {
                session,
                refresh_token,
            }))
        })
        .await
    }

    async fn get_user_sessions(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, SessionRow>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND expires_at > $2 \
                 ORDER BY created_at DESC"
            ))
            .bind(user_id)
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await?;
            Self::sessions_from_rows(rows)
        })
        .await
    }

    async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, SessionRow>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE expires_at > $1 \
                 ORDER BY created_at DESC"
            ))
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await?;
            Self::sessions_from_rows(rows)
        })
        .await
    }

    async fn cleanup_expired(&self) -> StoreResult<CleanupReport> {
        self.bounded(async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let tokens = sqlx::query(
                "DELETE FROM refresh_tokens WHERE expires_at <= $1 \
                 OR session_id IN (SELECT id FROM sessions WHERE expires_at <= $1)",
            )
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
                .bind(now)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(CleanupReport {
                sessions_deleted: sessions.rows_affected(),
                tokens_deleted: tokens.rows_affected(),
            })
        })
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.bounded(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
