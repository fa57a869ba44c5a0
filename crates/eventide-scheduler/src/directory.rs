//! The store the scheduler reads events from and writes
//! statuses back to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventide_core::{EventId, EventSnapshot, EventideError, Lifecycle, Result};
use tokio::sync::RwLock;

/// Read/write access to persisted events.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Every event, for the cold-start load.
    async fn list_all(&self) -> Result<Vec<EventSnapshot>>;

    /// One event, or `None` if it no longer exists.
    async fn get(&self, id: &EventId) -> Result<Option<EventSnapshot>>;

    /// Atomically overwrite an event's status pair.
    async fn set_status(&self, id: &EventId, lifecycle: Lifecycle, at: DateTime<Utc>)
    -> Result<()>;
}

/// In-memory directory for tests and embedding.
#[derive(Default)]
pub struct MemoryDirectory {
    events: RwLock<HashMap<EventId, EventSnapshot>>,
    writes: AtomicU64,
    fail_next_get: AtomicBool,
    fail_next_write: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, snapshot: EventSnapshot) {
        self.events.write().await.insert(snapshot.id.clone(), snapshot);
    }

    pub async fn remove(&self, id: &EventId) -> Option<EventSnapshot> {
        self.events.write().await.remove(id)
    }

    pub async fn lifecycle_of(&self, id: &EventId) -> Option<Lifecycle> {
        self.events.read().await.get(id).map(|s| s.lifecycle)
    }

    /// Number of successful `set_status` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `get` fail with a directory error.
    pub fn fail_next_get(&self) {
        self.fail_next_get.store(true, Ordering::SeqCst);
    }

    /// Make the next `set_status` fail with a directory error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventDirectory for MemoryDirectory {
    async fn list_all(&self) -> Result<Vec<EventSnapshot>> {
        let mut all: Vec<_> = self.events.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn get(&self, id: &EventId) -> Result<Option<EventSnapshot>> {
        if self.fail_next_get.swap(false, Ordering::SeqCst) {
            return Err(EventideError::Directory(format!("injected read failure for {id}")));
        }
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn set_status(
        &self,
        id: &EventId,
        lifecycle: Lifecycle,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(EventideError::Directory(format!("injected write failure for {id}")));
        }
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| EventideError::Directory(format!("event {id} not found")))?;
        event.lifecycle = lifecycle;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{EventSchedule, EventStatus, SubStatus};

    #[tokio::test]
    async fn test_upsert_get_and_write() {
        let dir = MemoryDirectory::new();
        let id = EventId::new("evt");
        dir.upsert(EventSnapshot::new(id.clone(), EventSchedule::default())).await;

        let ongoing = Lifecycle::new(EventStatus::Ongoing, SubStatus::EventStarted);
        dir.set_status(&id, ongoing, Utc::now()).await.unwrap();
        assert_eq!(dir.lifecycle_of(&id).await, Some(ongoing));
        assert_eq!(dir.write_count(), 1);
        assert_eq!(dir.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_fire_once() {
        let dir = MemoryDirectory::new();
        let id = EventId::new("evt");
        dir.upsert(EventSnapshot::new(id.clone(), EventSchedule::default())).await;

        dir.fail_next_get();
        assert!(dir.get(&id).await.is_err());
        assert!(dir.get(&id).await.unwrap().is_some());

        dir.fail_next_write();
        assert!(dir.set_status(&id, Lifecycle::DRAFT, Utc::now()).await.is_err());
        assert_eq!(dir.write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_to_missing_event_errors() {
        let dir = MemoryDirectory::new();
        let err = dir
            .set_status(&EventId::new("ghost"), Lifecycle::DRAFT, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EventideError::Directory(_)));
    }
}
