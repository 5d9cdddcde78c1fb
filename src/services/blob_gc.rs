use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::oid::ObjectId;

use crate::error::Result;
use crate::repositories::{BlobOutbox, BlobStore};

pub const SWEEP_BATCH: i64 = 100;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Deletes GridFS files listed in the outbox once their owners are gone.
pub struct BlobCollector {
    blobs: Arc<dyn BlobStore>,
    outbox: Arc<dyn BlobOutbox>,
}

impl BlobCollector {
    pub fn new(blobs: Arc<dyn BlobStore>, outbox: Arc<dyn BlobOutbox>) -> Self {
        Self { blobs, outbox }
    }

    /// Deletes the given blobs and clears their outbox rows. Failures stay
    /// queued for the periodic run. Returns how many were removed.
    pub async fn sweep(&self, file_ids: &[ObjectId]) -> usize {
        let mut removed = 0;
        for &file_id in file_ids {
            match self.collect_one(file_id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(%file_id, error = %e, "Blob deletion deferred to outbox");
                }
            }
        }
        removed
    }

    async fn collect_one(&self, file_id: ObjectId) -> Result<()> {
        self.blobs.delete(file_id).await?;
        self.outbox.complete(file_id).await
    }

    /// Processes the oldest queued rows.
    pub async fn run_pending(&self) -> Result<usize> {
        let pending = self.outbox.pending(SWEEP_BATCH).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        let file_ids: Vec<ObjectId> = pending.iter().map(|row| row.file_id).collect();
        let removed = self.sweep(&file_ids).await;
        tracing::info!(queued = file_ids.len(), removed, "Blob outbox sweep finished");
        Ok(removed)
    }

    /// Runs [`BlobCollector::run_pending`] forever on a fixed interval.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_pending().await {
                    tracing::error!(error = %e, "Blob outbox sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{BlobMetadata, MemoryBlobStore, MemoryStore};

    fn metadata() -> BlobMetadata {
        BlobMetadata {
            user_id: ObjectId::new(),
            original_name: "notes.pdf".to_string(),
            content_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn run_pending_drains_outbox() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(MemoryStore::new());
        let file_id = ObjectId::new();
        blobs.upload(file_id, &metadata(), b"%PDF").await.unwrap();
        store.enqueue(&[file_id]).await.unwrap();

        let collector = BlobCollector::new(blobs.clone(), store.clone());
        assert_eq!(collector.run_pending().await.unwrap(), 1);

        assert!(!blobs.contains(file_id).await);
        assert!(store.pending(10).await.unwrap().is_empty());
        assert_eq!(collector.run_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_blobs_still_clear_their_rows() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(MemoryStore::new());
        let file_id = ObjectId::new();
        store.enqueue(&[file_id]).await.unwrap();

        let collector = BlobCollector::new(blobs, store.clone());
        assert_eq!(collector.sweep(&[file_id]).await, 1);
        assert!(store.pending(10).await.unwrap().is_empty());
    }
}
