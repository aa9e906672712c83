//! Live permission-change fan-out.
//!
//! Each observer owns a bounded queue. Publishing never waits: a full queue
//! drops that observer's copy, a closed queue removes the observer. Dropping a
//! [`PermissionSubscription`] deregisters it, whether the connection closed
//! cleanly or failed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::Utc;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::auth::{Entitlements, RiskState};
use crate::models::permissions::PermissionEvent;

/// Per-observer queue depth.
pub const OBSERVER_BUFFER: usize = 32;

type Observers = HashMap<u64, mpsc::Sender<Arc<PermissionEvent>>>;

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    observers: Mutex<Observers>,
}

impl Inner {
    // A poisoned map is still a valid map.
    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What happened to one published event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

#[derive(Clone, Default)]
pub struct PermissionChannel {
    inner: Arc<Inner>,
}

impl PermissionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> PermissionSubscription {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers().insert(id, tx);
        debug!(observer = id, "permission observer subscribed");
        PermissionSubscription {
            id,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers().len()
    }

    /// Send a permission-change event to every open observer.
    pub fn publish(
        &self,
        user_id: &str,
        scopes: Vec<String>,
        risk: RiskState,
        entitlements: Entitlements,
    ) -> PublishReport {
        let event = Arc::new(PermissionEvent {
            user_id: user_id.to_string(),
            scopes,
            risk,
            entitlements,
            updated_at: Utc::now(),
        });

        let mut report = PublishReport::default();
        let mut observers = self.inner.observers();
        observers.retain(|id, tx| match tx.try_send(Arc::clone(&event)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(observer = id, "permission observer is lagging; event dropped");
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.removed += 1;
                false
            }
        });
        debug!(
            user_id,
            delivered = report.delivered,
            dropped = report.dropped,
            removed = report.removed,
            "permission update published"
        );
        report
    }
}

/// Stream of permission events for one observer.
pub struct PermissionSubscription {
    id: u64,
    rx: mpsc::Receiver<Arc<PermissionEvent>>,
    inner: Arc<Inner>,
}

impl PermissionSubscription {
    pub async fn recv(&mut self) -> Option<Arc<PermissionEvent>> {
        self.rx.recv().await
    }
}

impl Stream for PermissionSubscription {
    type Item = Arc<PermissionEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PermissionSubscription {
    fn drop(&mut self) {
        self.inner.observers().remove(&self.id);
        debug!(observer = self.id, "permission observer removed");
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn publish(channel: &PermissionChannel, user: &str) -> PublishReport {
        channel.publish(user, vec!["read".into()], RiskState::Ok, Entitlements::new())
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_event_once() {
        let channel = PermissionChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        let report = publish(&channel, "u1");
        assert_eq!(report.delivered, 2);

        assert_eq!(a.next().await.unwrap().user_id, "u1");
        assert_eq!(b.recv().await.unwrap().user_id, "u1");
        assert!(a.rx.try_recv().is_err());
        assert!(b.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_deregistered() {
        let channel = PermissionChannel::new();
        let keep = channel.subscribe();
        let gone = channel.subscribe();
        assert_eq!(channel.observer_count(), 2);

        drop(gone);
        assert_eq!(channel.observer_count(), 1);
        assert_eq!(publish(&channel, "u1").delivered, 1);
        drop(keep);
        assert_eq!(channel.observer_count(), 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_removed_on_publish() {
        let channel = PermissionChannel::new();
        let mut sub = channel.subscribe();
        sub.rx.close();

        let report = publish(&channel, "u1");
        assert_eq!(report.removed, 1);
        assert_eq!(channel.observer_count(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_does_not_block_others() {
        let channel = PermissionChannel::new();
        let _stalled = channel.subscribe();
        let mut live = channel.subscribe();

        for i in 0..OBSERVER_BUFFER {
            publish(&channel, &format!("u{i}"));
            live.recv().await.unwrap();
        }
        let report = publish(&channel, "late");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(live.recv().await.unwrap().user_id, "late");
    }
}
