//! Bounded in-memory audit store.
//!
//! Keeps at most `capacity` events, dropping the oldest. Totals and per-type
//! counts cover every event ever appended, not just the retained ones.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::AuditStore;
use crate::models::audit::{AuditEvent, AuditSummary};
use crate::session::StoreResult;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Ring {
    events: VecDeque<AuditEvent>,
    total: u64,
    by_type: BTreeMap<String, u64>,
}

#[derive(Debug)]
pub struct InMemoryAuditStore {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl InMemoryAuditStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(Ring::default()),
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        let mut ring = self.ring.lock().await;
        if ring.events.len() == self.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back(event.clone());
        ring.total += 1;
        *ring.by_type.entry(event.event_type.clone()).or_default() += 1;
        Ok(())
    }

    async fn summary(&self, recent_limit: usize) -> StoreResult<AuditSummary> {
        let ring = self.ring.lock().await;
        Ok(AuditSummary {
            total: ring.total,
            by_type: ring.by_type.clone(),
            recent: ring.events.iter().rev().take(recent_limit).cloned().collect(),
        })
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::uuid::uuidv7;

    fn event(kind: &str) -> AuditEvent {
        AuditEvent {
            id: uuidv7(),
            event_type: kind.into(),
            user_id: None,
            client_id: None,
            created_at: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn summary_is_newest_first_and_counts_by_type() {
        let store = InMemoryAuditStore::default();
        for kind in ["AUTH_FAILED", "AUTH_FAILED", "AUTH_SUCCESS"] {
            store.append(&event(kind)).await.unwrap();
        }
        let summary = store.summary(2).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_type["AUTH_FAILED"], 2);
        assert_eq!(summary.by_type["AUTH_SUCCESS"], 1);
        assert_eq!(summary.recent.len(), 2);
        assert_eq!(summary.recent[0].event_type, "AUTH_SUCCESS");
    }

    #[tokio::test]
    async fn ring_drops_oldest_but_keeps_counts() {
        let store = InMemoryAuditStore::with_capacity(2);
        let first = event("AUTH_SUCCESS");
        store.append(&first).await.unwrap();
        store.append(&event("TOKEN_REFRESHED")).await.unwrap();
        store.append(&event("SESSION_REVOKED")).await.unwrap();

        let summary = store.summary(10).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.recent.len(), 2);
        assert!(summary.recent.iter().all(|e| e.id != first.id));
        assert_eq!(summary.by_type["AUTH_SUCCESS"], 1);
    }
}
