use crate::config::serde_helpers::duration_ms;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum QueueError {
    #[cfg(feature = "disk-fallback")]
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("Deserialization error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("Persistent storage is not available in this build")]
    Unsupported,
}

/// An event that could not be delivered and waits for a later flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub id: u64,
    pub serialized_payload: String,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: i64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineQueueConfig {
    pub max_entries: usize,
    #[serde(with = "duration_ms", rename = "max_age_ms")]
    pub max_age: Duration,
    /// Directory for the persistent store. Memory-only when unset.
    pub storage_path: Option<PathBuf>,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_age: Duration::from_secs(24 * 3600),
            storage_path: None,
        }
    }
}

struct QueueState {
    entries: VecDeque<QueuedEvent>,
    next_id: u64,
}

/// Ordered store of undelivered events.
///
/// `drain` hands out a snapshot without removing anything; entries leave the
/// queue only through `acknowledge`, so a failed redelivery keeps its place.
/// When a storage path is configured (and the `disk-fallback` feature is
/// on) every change is mirrored to a sled tree keyed by big-endian id, which
/// keeps iteration in enqueue order across restarts.
pub struct OfflineQueue {
    config: OfflineQueueConfig,
    state: Mutex<QueueState>,
    store: Option<store::PersistentStore>,
}

impl OfflineQueue {
    pub fn in_memory(config: OfflineQueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                next_id: 0,
            }),
            store: None,
        }
    }

    /// Opens the queue, reloading persisted entries. Falls back to memory-only
    /// when the store cannot be opened.
    pub fn open(config: OfflineQueueConfig) -> Self {
        let Some(path) = config.storage_path.clone() else {
            return Self::in_memory(config);
        };

        let opened = store::PersistentStore::open(&path).and_then(|store| {
            let entries = store.load()?;
            Ok((store, entries))
        });

        match opened {
            Ok((store, entries)) => {
                let next_id = entries.back().map_or(0, |e| e.id + 1);
                if !entries.is_empty() {
                    info!(
                        "Restored {} queued events from {}",
                        entries.len(),
                        path.display()
                    );
                }
                let queue = Self {
                    config,
                    state: Mutex::new(QueueState { entries, next_id }),
                    store: Some(store),
                };
                queue.evict_expired();
                queue.enforce_capacity();
                queue
            }
            Err(e) => {
                warn!(
                    "Offline storage unavailable at {}, keeping queue in memory: {}",
                    path.display(),
                    e
                );
                Self::in_memory(config)
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn enqueue(&self, serialized_payload: String, attempts: u32) -> u64 {
        self.enqueue_at(serialized_payload, attempts, now_millis())
    }

    pub fn enqueue_at(&self, serialized_payload: String, attempts: u32, enqueued_at: i64) -> u64 {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;

            let event = QueuedEvent {
                id,
                serialized_payload,
                enqueued_at,
                attempts,
            };
            self.persist(&event);
            state.entries.push_back(event);
            id
        };

        self.evict_expired_at(enqueued_at);
        self.enforce_capacity();
        debug!("Queued event {} for later delivery", id);
        id
    }

    /// Snapshot of every entry in enqueue order. Nothing is removed.
    pub fn drain(&self) -> Vec<QueuedEvent> {
        self.evict_expired();
        self.state.lock().entries.iter().cloned().collect()
    }

    /// Removes entries whose redelivery succeeded.
    pub fn acknowledge(&self, ids: &[u64]) {
        let mut state = self.state.lock();
        state.entries.retain(|e| !ids.contains(&e.id));
        for id in ids {
            self.unpersist(*id);
        }
    }

    /// Counts a failed redelivery; the entries keep their position.
    pub fn record_failure(&self, ids: &[u64]) {
        let mut state = self.state.lock();
        for event in state.entries.iter_mut().filter(|e| ids.contains(&e.id)) {
            event.attempts += 1;
            self.persist(event);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(now_millis())
    }

    pub fn evict_expired_at(&self, now: i64) -> usize {
        let max_age = i64::try_from(self.config.max_age.as_millis()).unwrap_or(i64::MAX);
        let mut state = self.state.lock();
        let mut evicted = 0;

        while let Some(front) = state.entries.front() {
            if now.saturating_sub(front.enqueued_at) <= max_age {
                break;
            }
            if let Some(expired) = state.entries.pop_front() {
                self.unpersist(expired.id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!("Evicted {} expired queued events", evicted);
        }
        evicted
    }

    /// Writes buffered changes through to disk.
    pub async fn persist_all(&self) -> Result<(), QueueError> {
        match &self.store {
            Some(store) => store.flush().await,
            None => Ok(()),
        }
    }

    fn enforce_capacity(&self) -> usize {
        let mut state = self.state.lock();
        let mut evicted = 0;
        while state.entries.len() > self.config.max_entries {
            if let Some(oldest) = state.entries.pop_front() {
                self.unpersist(oldest.id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            warn!(
                "Offline queue full ({} entries), evicted {} oldest events",
                self.config.max_entries, evicted
            );
        }
        evicted
    }

    fn persist(&self, event: &QueuedEvent) {
        if let Some(store) = &self.store
            && let Err(e) = store.put(event)
        {
            warn!("Failed to persist queued event {}: {}", event.id, e);
        }
    }

    fn unpersist(&self, id: u64) {
        if let Some(store) = &self.store
            && let Err(e) = store.remove(id)
        {
            warn!("Failed to remove queued event {} from storage: {}", id, e);
        }
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(feature = "disk-fallback")]
mod store {
    use super::{QueueError, QueuedEvent};
    use std::collections::VecDeque;
    use std::path::Path;
    use tracing::warn;

    const TREE_NAME: &str = "offline_queue";

    pub(super) struct PersistentStore {
        tree: sled::Tree,
    }

    impl PersistentStore {
        pub(super) fn open(path: &Path) -> Result<Self, QueueError> {
            let db = sled::open(path)?;
            let tree = db.open_tree(TREE_NAME)?;
            Ok(Self { tree })
        }

        pub(super) fn load(&self) -> Result<VecDeque<QueuedEvent>, QueueError> {
            let mut entries = VecDeque::new();
            for item in &self.tree {
                let (key, value) = item?;
                match bincode::serde::decode_from_slice::<QueuedEvent, _>(
                    &value,
                    bincode::config::standard(),
                ) {
                    Ok((event, _)) => entries.push_back(event),
                    Err(e) => {
                        warn!("Dropping unreadable queued event: {}", e);
                        self.tree.remove(key)?;
                    }
                }
            }
            Ok(entries)
        }

        pub(super) fn put(&self, event: &QueuedEvent) -> Result<(), QueueError> {
            let bytes = bincode::serde::encode_to_vec(event, bincode::config::standard())?;
            self.tree.insert(event.id.to_be_bytes(), bytes)?;
            Ok(())
        }

        pub(super) fn remove(&self, id: u64) -> Result<(), QueueError> {
            self.tree.remove(id.to_be_bytes())?;
            Ok(())
        }

        pub(super) async fn flush(&self) -> Result<(), QueueError> {
            self.tree.flush_async().await?;
            Ok(())
        }
    }
}

#[cfg(not(feature = "disk-fallback"))]
mod store {
    use super::{QueueError, QueuedEvent};
    use std::collections::VecDeque;
    use std::path::Path;

    pub(super) struct PersistentStore;

    impl PersistentStore {
        pub(super) fn open(_path: &Path) -> Result<Self, QueueError> {
            Err(QueueError::Unsupported)
        }

        pub(super) fn load(&self) -> Result<VecDeque<QueuedEvent>, QueueError> {
            Ok(VecDeque::new())
        }

        pub(super) fn put(&self, _event: &QueuedEvent) -> Result<(), QueueError> {
            Ok(())
        }

        pub(super) fn remove(&self, _id: u64) -> Result<(), QueueError> {
            Ok(())
        }

        pub(super) async fn flush(&self) -> Result<(), QueueError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize) -> OfflineQueueConfig {
        OfflineQueueConfig {
            max_entries,
            max_age: Duration::from_secs(60),
            storage_path: None,
        }
    }

    #[test]
    fn drain_preserves_order_without_removing() {
        let queue = OfflineQueue::in_memory(config(10));
        queue.enqueue("a".into(), 3);
        queue.enqueue("b".into(), 3);

        let drained = queue.drain();
        let payloads: Vec<_> = drained.iter().map(|e| e.serialized_payload.as_str()).collect();
        assert_eq!(payloads, vec!["a", "b"]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn acknowledge_removes_only_delivered() {
        let queue = OfflineQueue::in_memory(config(10));
        let a = queue.enqueue("a".into(), 1);
        queue.enqueue("b".into(), 1);
        let c = queue.enqueue("c".into(), 1);

        queue.acknowledge(&[a, c]);
        let left: Vec<_> = queue.drain().into_iter().map(|e| e.serialized_payload).collect();
        assert_eq!(left, vec!["b"]);
    }

    #[test]
    fn failed_redelivery_keeps_position() {
        let queue = OfflineQueue::in_memory(config(10));
        let a = queue.enqueue("a".into(), 1);
        queue.enqueue("b".into(), 1);

        queue.record_failure(&[a]);
        queue.enqueue("c".into(), 1);

        let drained = queue.drain();
        assert_eq!(drained[0].serialized_payload, "a");
        assert_eq!(drained[0].attempts, 2);
        assert_eq!(drained[2].serialized_payload, "c");
    }

    #[test]
    fn evicts_oldest_when_full() {
        let queue = OfflineQueue::in_memory(config(2));
        queue.enqueue("a".into(), 1);
        queue.enqueue("b".into(), 1);
        queue.enqueue("c".into(), 1);

        let left: Vec<_> = queue.drain().into_iter().map(|e| e.serialized_payload).collect();
        assert_eq!(left, vec!["b", "c"]);
    }

    #[test]
    fn evicts_expired_entries() {
        let now = chrono::Utc::now().timestamp_millis();
        let queue = OfflineQueue::in_memory(config(10));
        queue.enqueue_at("old".into(), 1, now - 120_000);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.evict_expired_at(now), 1);

        queue.enqueue_at("stale".into(), 1, now - 120_000);
        queue.enqueue_at("new".into(), 1, now);
        let left: Vec<_> = queue.drain().into_iter().map(|e| e.serialized_payload).collect();
        assert_eq!(left, vec!["new"]);
    }

    #[test]
    fn missing_storage_path_means_memory_only() {
        let queue = OfflineQueue::open(config(10));
        assert!(!queue.is_persistent());
    }

    #[cfg(feature = "disk-fallback")]
    #[tokio::test]
    async fn persisted_entries_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OfflineQueueConfig {
            storage_path: Some(dir.path().join("queue")),
            ..config(10)
        };

        {
            let queue = OfflineQueue::open(config.clone());
            assert!(queue.is_persistent());
            let a = queue.enqueue("a".into(), 3);
            queue.enqueue("b".into(), 3);
            queue.acknowledge(&[a]);
            queue.persist_all().await.unwrap();
        }

        let reopened = OfflineQueue::open(config);
        let drained = reopened.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].serialized_payload, "b");

        let next = reopened.enqueue("c".into(), 1);
        assert!(next > drained[0].id);
    }
}
