use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;
use uuid::Uuid;

/// How long a finished entry stays visible before it expires.
const SENT_TTL: Duration = Duration::from_secs(30);
const FAILED_TTL: Duration = Duration::from_secs(60);

/// Optimistic send state for one recipient. Uploads run detached from
/// navigation, so the UI reads this instead of blocking on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Uploading,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxEvent {
    Updated {
        recipient_id: Uuid,
        state: SendState,
    },
    Cleared {
        recipient_id: Uuid,
    },
}

struct Entry {
    state: SendState,
    expires_at: Option<Instant>,
}

/// Tracks in-flight sends, keyed by recipient. Constructed once per app
/// session and injected where needed; the server's inbox/outbox remains
/// the source of truth, and entries here are advisory and expire on
/// their own.
#[derive(Clone)]
pub struct OutboxTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    entries: RwLock<HashMap<Uuid, Entry>>,
    changed_tx: broadcast::Sender<OutboxEvent>,
}

impl OutboxTracker {
    pub fn new() -> Self {
        let (changed_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(TrackerInner {
                entries: RwLock::new(HashMap::new()),
                changed_tx,
            }),
        }
    }

    /// Subscribe to state changes. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.inner.changed_tx.subscribe()
    }

    /// Record that an upload for `recipient_id` has started.
    pub async fn begin(&self, recipient_id: Uuid) {
        self.set(
            recipient_id,
            Entry {
                state: SendState::Uploading,
                expires_at: None,
            },
        )
        .await;
    }

    /// Record a successful send. The entry lingers briefly so the UI can
    /// show the checkmark, then expires.
    pub async fn mark_sent(&self, recipient_id: Uuid) {
        self.set(
            recipient_id,
            Entry {
                state: SendState::Sent,
                expires_at: Some(Instant::now() + SENT_TTL),
            },
        )
        .await;
    }

    /// Record a failed send. Failures stay visible longer than successes.
    pub async fn mark_failed(&self, recipient_id: Uuid) {
        self.set(
            recipient_id,
            Entry {
                state: SendState::Failed,
                expires_at: Some(Instant::now() + FAILED_TTL),
            },
        )
        .await;
    }

    async fn set(&self, recipient_id: Uuid, entry: Entry) {
        let state = entry.state;
        self.inner.entries.write().await.insert(recipient_id, entry);
        let _ = self.inner.changed_tx.send(OutboxEvent::Updated {
            recipient_id,
            state,
        });
    }

    /// Current state for a recipient, if any non-expired entry exists.
    pub async fn status(&self, recipient_id: Uuid) -> Option<SendState> {
        self.purge_expired().await;
        self.inner
            .entries
            .read()
            .await
            .get(&recipient_id)
            .map(|e| e.state)
    }

    /// All live entries, for rendering the full send list.
    pub async fn snapshot(&self) -> HashMap<Uuid, SendState> {
        self.purge_expired().await;
        self.inner
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| (*id, e.state))
            .collect()
    }

    /// Drop the entry for a recipient (e.g. after the user dismisses a
    /// failure).
    pub async fn clear(&self, recipient_id: Uuid) {
        let removed = self
            .inner
            .entries
            .write()
            .await
            .remove(&recipient_id)
            .is_some();
        if removed {
            let _ = self
                .inner
                .changed_tx
                .send(OutboxEvent::Cleared { recipient_id });
        }
    }

    async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.inner.entries.write().await;
        let expired: Vec<Uuid> = entries
            .iter()
            .filter(|(_, e)| e.expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| *id)
            .collect();
        for recipient_id in expired {
            entries.remove(&recipient_id);
            let _ = self
                .inner
                .changed_tx
                .send(OutboxEvent::Cleared { recipient_id });
        }
    }
}

impl Default for OutboxTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sent_entries_expire_after_thirty_seconds() {
        let tracker = OutboxTracker::new();
        let recipient = Uuid::new_v4();

        tracker.begin(recipient).await;
        assert_eq!(tracker.status(recipient).await, Some(SendState::Uploading));

        // uploading entries never expire on their own
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(tracker.status(recipient).await, Some(SendState::Uploading));

        tracker.mark_sent(recipient).await;
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(tracker.status(recipient).await, Some(SendState::Sent));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.status(recipient).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_entries_linger_longer() {
        let tracker = OutboxTracker::new();
        let recipient = Uuid::new_v4();

        tracker.mark_failed(recipient).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(tracker.status(recipient).await, Some(SendState::Failed));

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(tracker.status(recipient).await, None);
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_clears() {
        let tracker = OutboxTracker::new();
        let mut events = tracker.subscribe();
        let recipient = Uuid::new_v4();

        tracker.begin(recipient).await;
        tracker.mark_sent(recipient).await;
        tracker.clear(recipient).await;

        assert_eq!(
            events.recv().await.unwrap(),
            OutboxEvent::Updated {
                recipient_id: recipient,
                state: SendState::Uploading
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            OutboxEvent::Updated {
                recipient_id: recipient,
                state: SendState::Sent
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            OutboxEvent::Cleared {
                recipient_id: recipient
            }
        );
    }

    #[tokio::test]
    async fn trackers_are_independent() {
        let a = OutboxTracker::new();
        let b = OutboxTracker::new();
        let recipient = Uuid::new_v4();

        a.mark_failed(recipient).await;
        assert_eq!(a.status(recipient).await, Some(SendState::Failed));
        assert_eq!(b.status(recipient).await, None);
        assert!(b.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn clearing_an_absent_recipient_emits_nothing() {
        let tracker = OutboxTracker::new();
        let mut events = tracker.subscribe();

        tracker.clear(Uuid::new_v4()).await;
        tracker.begin(Uuid::new_v4()).await;

        // the first event received is the begin, not a clear
        assert!(matches!(
            events.recv().await.unwrap(),
            OutboxEvent::Updated {
                state: SendState::Uploading,
                ..
            }
        ));
    }
}
