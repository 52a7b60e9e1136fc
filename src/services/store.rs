use crate::models::{UploadRecord, UploadState};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Persistence boundary for upload records. The pipeline only needs these
/// four capabilities; durable engines live behind the same trait outside
/// this crate.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn save(&self, record: UploadRecord) -> Result<()>;
    async fn load(&self, id: Uuid) -> Result<Option<UploadRecord>>;
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Ids of records in a terminal state that finished before `cutoff`,
    /// for the retention sweep.
    async fn terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
}

/// In-memory store for embedded use and tests.
#[derive(Default)]
pub struct MemoryUploadStore {
    records: DashMap<Uuid, UploadRecord>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn save(&self, record: UploadRecord) -> Result<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.remove(&id);
        Ok(())
    }

    async fn terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| {
                entry.value().state.is_terminal()
                    && entry
                        .value()
                        .finished_at
                        .map(|finished| finished < cutoff)
                        .unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete_roundtrip() {
        let store = MemoryUploadStore::new();
        let record = UploadRecord::new("alice", "parcels.zip");
        let id = record.id;

        store.save(record).await.unwrap();
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.state, UploadState::Pending);

        store.delete(id).await.unwrap();
        assert!(store.load(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_before_skips_live_and_recent_records() {
        let store = MemoryUploadStore::new();

        let live = UploadRecord::new("alice", "live.zip");
        let live_id = live.id;
        store.save(live).await.unwrap();

        let mut done = UploadRecord::new("alice", "done.zip");
        let done_id = done.id;
        done.advance(UploadState::Staging).unwrap();
        done.advance(UploadState::Failed).unwrap();
        store.save(done).await.unwrap();

        // Cutoff before anything finished: nothing is due.
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        assert!(store.terminal_before(long_ago).await.unwrap().is_empty());

        // Cutoff in the future: only the terminal record is due.
        let soon = Utc::now() + chrono::Duration::seconds(1);
        let due = store.terminal_before(soon).await.unwrap();
        assert_eq!(due, vec![done_id]);
        assert_ne!(due[0], live_id);
    }
}
