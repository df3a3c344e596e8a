//! Turns redownload verdicts into blobber fetch tickets

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::db::QueueAction;
use crate::refresh::store::RefreshStore;

#[derive(Clone)]
pub struct QueueDeriver {
    store: Arc<dyn RefreshStore>,
}

impl QueueDeriver {
    pub fn new(store: Arc<dyn RefreshStore>) -> Self {
        Self { store }
    }

    /// Ensure every blobber of the video holds a fetch ticket for it.
    ///
    /// Associations are read fresh. Existing tickets are left alone, and the
    /// first failing insert aborts the remaining ones. The video's pending
    /// verdict is cleared only after every ticket is in place, so a failed
    /// run is repeated on the next cycle. Returns the number of tickets
    /// created.
    pub async fn enqueue(&self, video_id: &str) -> Result<usize> {
        let blobbers = self
            .store
            .blobbers_for_video(video_id)
            .await
            .with_context(|| format!("Failed to load blobbers of video {}", video_id))?;

        let mut created = 0;
        for blobber_id in blobbers {
            let inserted = self
                .store
                .insert_queue_entry_if_absent(video_id, blobber_id, QueueAction::FetchBlob)
                .await
                .with_context(|| {
                    format!("Failed to queue video {} for blobber {}", video_id, blobber_id)
                })?;
            if inserted {
                debug!(video_id = %video_id, blobber_id, "Queued blob fetch");
                created += 1;
            }
        }

        self.store
            .clear_pending_download(video_id)
            .await
            .with_context(|| format!("Failed to clear pending download of video {}", video_id))?;

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::{CreateBlobber, CreateVideo, Database, VideoRecord};
    use crate::refresh::store::RefreshWrite;
    use crate::refresh::testing::seed_fetched;

    async fn blobber(db: &Database, name: &str) -> i64 {
        db.blobbers()
            .create(CreateBlobber {
                name: name.to_string(),
                secret: "s".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let first = blobber(&db, "one").await;
        let second = blobber(&db, "two").await;
        db.videos()
            .create(CreateVideo {
                id: "v".to_string(),
                blobber_ids: vec![first, second],
            })
            .await
            .unwrap();
        let deriver = QueueDeriver::new(Arc::new(db.clone()));

        assert_eq!(deriver.enqueue("v").await.unwrap(), 2);
        assert_eq!(deriver.enqueue("v").await.unwrap(), 0);

        for id in [first, second] {
            let entries = db
                .queue()
                .list_for_blobber(id, QueueAction::FetchBlob)
                .await
                .unwrap();
            assert_eq!(entries.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_enqueue_reads_current_associations() {
        let db = Database::in_memory().await.unwrap();
        let first = blobber(&db, "one").await;
        db.videos()
            .create(CreateVideo {
                id: "v".to_string(),
                blobber_ids: vec![],
            })
            .await
            .unwrap();
        let deriver = QueueDeriver::new(Arc::new(db.clone()));

        assert_eq!(deriver.enqueue("v").await.unwrap(), 0);
        db.blobbers().assign("v", first).await.unwrap();
        assert_eq!(deriver.enqueue("v").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_clears_pending_verdict() {
        let db = Database::in_memory().await.unwrap();
        let first = blobber(&db, "one").await;
        seed_fetched(&db, "v", |v| v.pending_download = true).await;
        db.blobbers().assign("v", first).await.unwrap();
        let deriver = QueueDeriver::new(Arc::new(db.clone()));

        assert_eq!(deriver.enqueue("v").await.unwrap(), 1);

        let stored = db.videos().find_by_id("v").await.unwrap().unwrap();
        assert!(!stored.pending_download);
    }

    /// Delegates to the database but refuses tickets for one blobber
    struct RejectingStore {
        db: Database,
        rejected: i64,
    }

    #[async_trait]
    impl RefreshStore for RejectingStore {
        async fn list_active_videos(&self) -> Result<Vec<VideoRecord>> {
            self.db.list_active_videos().await
        }

        async fn commit_refresh(&self, write: &RefreshWrite) -> Result<()> {
            self.db.commit_refresh(write).await
        }

        async fn blobbers_for_video(&self, video_id: &str) -> Result<Vec<i64>> {
            self.db.blobbers_for_video(video_id).await
        }

        async fn clear_pending_download(&self, video_id: &str) -> Result<()> {
            self.db.clear_pending_download(video_id).await
        }

        async fn insert_queue_entry_if_absent(
            &self,
            video_id: &str,
            blobber_id: i64,
            action: QueueAction,
        ) -> Result<bool> {
            if blobber_id == self.rejected {
                anyhow::bail!("queue unavailable");
            }
            self.db
                .insert_queue_entry_if_absent(video_id, blobber_id, action)
                .await
        }
    }

    #[tokio::test]
    async fn test_first_failure_aborts_remaining_tickets() {
        let db = Database::in_memory().await.unwrap();
        let first = blobber(&db, "one").await;
        let second = blobber(&db, "two").await;
        seed_fetched(&db, "v", |v| v.pending_download = true).await;
        db.blobbers().assign("v", first).await.unwrap();
        db.blobbers().assign("v", second).await.unwrap();
        let deriver = QueueDeriver::new(Arc::new(RejectingStore {
            db: db.clone(),
            rejected: first,
        }));

        assert!(deriver.enqueue("v").await.is_err());

        for id in [first, second] {
            assert!(
                db.queue()
                    .list_for_blobber(id, QueueAction::FetchBlob)
                    .await
                    .unwrap()
                    .is_empty()
            );
        }
        let stored = db.videos().find_by_id("v").await.unwrap().unwrap();
        assert!(stored.pending_download);
    }

    #[tokio::test]
    async fn test_enqueue_fails_when_storage_fails() {
        let db = Database::in_memory().await.unwrap();
        let first = blobber(&db, "one").await;
        db.videos()
            .create(CreateVideo {
                id: "v".to_string(),
                blobber_ids: vec![first],
            })
            .await
            .unwrap();
        sqlx::query("DROP TABLE blob_queue")
            .execute(db.pool())
            .await
            .unwrap();

        let deriver = QueueDeriver::new(Arc::new(db));
        assert!(deriver.enqueue("v").await.is_err());
    }
}
