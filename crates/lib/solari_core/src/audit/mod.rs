//! Append-only audit log.
//!
//! [`AuditLog`] stamps events with an id and timestamp and hands them to an
//! [`AuditStore`]. The Postgres store is the durable one; the in-memory ring
//! keeps only the most recent events but exact counters.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::models::audit::{AuditContext, AuditEvent, AuditEventType, AuditSummary};
use crate::session::StoreResult;
use crate::uuid::uuidv7;

/// Default number of events returned by a summary.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()>;
    /// Totals plus the `recent_limit` newest events, newest first.
    async fn summary(&self, recent_limit: usize) -> StoreResult<AuditSummary>;
    fn is_durable(&self) -> bool;
}

/// Owned audit log handle; cheap to clone.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one event.
    pub async fn record(
        &self,
        event_type: AuditEventType,
        context: AuditContext,
    ) -> StoreResult<AuditEvent> {
        let event = AuditEvent {
            id: uuidv7(),
            event_type: event_type.as_str().to_string(),
            user_id: context.user_id,
            client_id: context.client_id,
            created_at: Utc::now(),
            metadata: context.metadata,
        };
        self.store.append(&event).await?;
        debug!(event_type = %event_type, "audit event recorded");
        Ok(event)
    }

    pub async fn summary(&self, recent_limit: usize) -> StoreResult<AuditSummary> {
        self.store.summary(recent_limit).await
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::audit::memory::InMemoryAuditStore;

    #[tokio::test]
    async fn record_stamps_id_and_type() {
        let log = AuditLog::new(Arc::new(InMemoryAuditStore::default()));
        let event = log
            .record(
                AuditEventType::AuthFailed,
                AuditContext::default()
                    .client("app1")
                    .metadata(json!({"reason": "invalid_credentials"})),
            )
            .await
            .unwrap();
        assert_eq!(event.event_type, "AUTH_FAILED");
        assert_eq!(event.client_id.as_deref(), Some("app1"));
        assert!(event.user_id.is_none());

        let summary = log.summary(10).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.recent[0].id, event.id);
        assert!(!log.is_durable());
    }
}
