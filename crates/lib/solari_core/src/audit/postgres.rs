//! Durable audit store on the `audit_events` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::AuditStore;
use crate::models::audit::{AuditEvent, AuditSummary};
use crate::session::{StoreError, StoreResult};

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    event_type: String,
    user_id: Option<String>,
    client_id: Option<String>,
    metadata: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEvent {
    fn from(row: AuditRow) -> Self {
        AuditEvent {
            id: row.id,
            event_type: row.event_type,
            user_id: row.user_id,
            client_id: row.client_id,
            created_at: row.created_at,
            metadata: row.metadata.map(|m| m.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgAuditStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        let insert = sqlx::query(
            "INSERT INTO audit_events (id, event_type, user_id, client_id, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(&event.user_id)
        .bind(&event.client_id)
        .bind(event.metadata.as_ref().map(Json))
        .bind(event.created_at)
        .execute(&self.pool);
        tokio::time::timeout(self.op_timeout, insert)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))??;
        Ok(())
    }

    async fn summary(&self, recent_limit: usize) -> StoreResult<AuditSummary> {
        let work = async {
            let counts = sqlx::query_as::<_, (String, i64)>(
                "SELECT event_type, COUNT(*) FROM audit_events GROUP BY event_type",
            )
            .fetch_all(&self.pool)
            .await?;
            let limit = i64::try_from(recent_limit).unwrap_or(i64::MAX);
            let rows = sqlx::query_as::<_, AuditRow>(
                "SELECT id, event_type, user_id, client_id, metadata, created_at \
                 FROM audit_events ORDER BY created_at DESC, id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            let mut summary = AuditSummary::default();
            for (event_type, count) in counts {
                let count = count.max(0) as u64;
                summary.total += count;
                summary.by_type.insert(event_type, count);
            }
            summary.recent = rows.into_iter().map(AuditEvent::from).collect();
            Ok::<_, StoreError>(summary)
        };
        tokio::time::timeout(self.op_timeout, work)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }

    fn is_durable(&self) -> bool {
        true
    }
}
