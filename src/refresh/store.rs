//! Storage boundary of the refresh engine

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::db::history::{insert_counter_snapshot, insert_history};
use crate::db::videos::write_refreshed;
use crate::db::{
    CreateCounterSnapshot, CreateVideoHistory, Database, QueueAction, VideoRecord,
};

/// Everything persisted for one refreshed video
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshWrite {
    pub video: VideoRecord,
    pub history: Vec<CreateVideoHistory>,
    pub counters: Vec<CreateCounterSnapshot>,
}

/// Storage operations needed by a refresh cycle
#[async_trait]
pub trait RefreshStore: Send + Sync {
    async fn list_active_videos(&self) -> Result<Vec<VideoRecord>>;

    /// Persist history, counter snapshots and the updated record atomically
    async fn commit_refresh(&self, write: &RefreshWrite) -> Result<()>;

    async fn blobbers_for_video(&self, video_id: &str) -> Result<Vec<i64>>;

    /// Drop the persisted redownload verdict once its tickets are queued
    async fn clear_pending_download(&self, video_id: &str) -> Result<()>;

    /// Returns true if a new entry was created
    async fn insert_queue_entry_if_absent(
        &self,
        video_id: &str,
        blobber_id: i64,
        action: QueueAction,
    ) -> Result<bool>;
}

#[async_trait]
impl RefreshStore for Database {
    async fn list_active_videos(&self) -> Result<Vec<VideoRecord>> {
        self.videos().list_active().await
    }

    async fn commit_refresh(&self, write: &RefreshWrite) -> Result<()> {
        let video_id = &write.video.id;
        let mut tx = self.pool().begin().await?;

        for row in &write.history {
            insert_history(&mut *tx, row)
                .await
                .with_context(|| format!("Failed to record '{}' history", row.field))?;
        }

        for row in &write.counters {
            insert_counter_snapshot(&mut *tx, row)
                .await
                .with_context(|| format!("Failed to record {:?} snapshot", row.kind))?;
        }

        // The record goes last so a failed history write leaves it untouched
        let affected = write_refreshed(&mut *tx, &write.video)
            .await
            .context("Failed to update video")?;
        if affected == 0 {
            bail!("Video {} disappeared during refresh", video_id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn blobbers_for_video(&self, video_id: &str) -> Result<Vec<i64>> {
        self.blobbers().ids_for_video(video_id).await
    }

    async fn clear_pending_download(&self, video_id: &str) -> Result<()> {
        self.videos().clear_pending_download(video_id).await
    }

    async fn insert_queue_entry_if_absent(
        &self,
        video_id: &str,
        blobber_id: i64,
        action: QueueAction,
    ) -> Result<bool> {
        self.queue()
            .insert_if_absent(video_id, blobber_id, action)
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{CounterKind, CreateVideo};

    async fn seeded() -> (Database, VideoRecord) {
        let db = Database::in_memory().await.unwrap();
        let video = db
            .videos()
            .create(CreateVideo {
                id: "v".to_string(),
                blobber_ids: vec![],
            })
            .await
            .unwrap();
        (db, video)
    }

    fn write_for(video: &VideoRecord) -> RefreshWrite {
        let at = Utc::now();
        let mut updated = video.clone();
        updated.title = "New".to_string();
        updated.like_count = 5;
        updated.fetched = true;
        updated.last_updated = Some(at);
        updated.pending_download = true;

        RefreshWrite {
            video: updated,
            history: vec![CreateVideoHistory {
                video_id: video.id.clone(),
                field: "title".to_string(),
                old: String::new(),
                new: "New".to_string(),
                updated_at: at,
            }],
            counters: vec![CreateCounterSnapshot {
                kind: CounterKind::Likes,
                video_id: video.id.clone(),
                value: 5,
                recorded_at: at,
            }],
        }
    }

    #[tokio::test]
    async fn test_commit_writes_everything() {
        let (db, video) = seeded().await;
        db.commit_refresh(&write_for(&video)).await.unwrap();

        let stored = db.videos().find_by_id("v").await.unwrap().unwrap();
        assert_eq!(stored.title, "New");
        assert!(stored.fetched);
        assert!(stored.pending_download);
        assert_eq!(db.history().list_for_video("v").await.unwrap().len(), 1);
        assert_eq!(
            db.history()
                .counter_series(CounterKind::Likes, "v")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_snapshot_rolls_back_video() {
        let (db, video) = seeded().await;
        sqlx::query("DROP TABLE video_like_history")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.commit_refresh(&write_for(&video)).await.is_err());

        let stored = db.videos().find_by_id("v").await.unwrap().unwrap();
        assert_eq!(stored, video);
        assert!(db.history().list_for_video("v").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_of_unknown_video_fails() {
        let (db, video) = seeded().await;
        let mut write = write_for(&video);
        write.video.id = "ghost".to_string();
        write.history.clear();
        write.counters.clear();

        assert!(db.commit_refresh(&write).await.is_err());
    }
}
