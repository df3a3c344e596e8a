//! Blobber work queue repository
//!
//! A queue entry is identified by (video, blobber, action). Inserting an
//! entry that already exists is a no-op.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{decode_err, str_to_datetime};

/// What a blobber should do with a video's assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    FetchBlob,
    RemoveBlob,
}

impl QueueAction {
    pub fn code(self) -> i64 {
        match self {
            Self::FetchBlob => 1,
            Self::RemoveBlob => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::FetchBlob),
            2 => Some(Self::RemoveBlob),
            _ => None,
        }
    }
}

/// Queue entry record from database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub video_id: String,
    pub blobber_id: i64,
    pub action: QueueAction,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for QueueEntry {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let action_code: i64 = row.try_get("action")?;
        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            video_id: row.try_get("video_id")?,
            blobber_id: row.try_get("blobber_id")?,
            action: QueueAction::from_code(action_code)
                .ok_or_else(|| decode_err(anyhow!("Unknown queue action {}", action_code)))?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
        })
    }
}

pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a queue entry unless an identical one exists.
    /// Returns true if a new entry was created.
    pub async fn insert_if_absent(
        &self,
        video_id: &str,
        blobber_id: i64,
        action: QueueAction,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO blob_queue (video_id, blobber_id, action)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (video_id, blobber_id, action) DO NOTHING
            "#,
        )
        .bind(video_id)
        .bind(blobber_id)
        .bind(action.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub async fn find_entry(
        &self,
        video_id: &str,
        blobber_id: i64,
        action: QueueAction,
    ) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT video_id, blobber_id, action, created_at
            FROM blob_queue
            WHERE video_id = ?1 AND blobber_id = ?2 AND action = ?3
            "#,
        )
        .bind(video_id)
        .bind(blobber_id)
        .bind(action.code())
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Get all entries of one action for a blobber, oldest first
    pub async fn list_for_blobber(
        &self,
        blobber_id: i64,
        action: QueueAction,
    ) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT video_id, blobber_id, action, created_at
            FROM blob_queue
            WHERE blobber_id = ?1 AND action = ?2
            ORDER BY created_at, video_id
            "#,
        )
        .bind(blobber_id)
        .bind(action.code())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Delete an entry. Returns false if it did not exist.
    pub async fn remove(&self, video_id: &str, blobber_id: i64, action: QueueAction) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM blob_queue WHERE video_id = ?1 AND blobber_id = ?2 AND action = ?3",
        )
        .bind(video_id)
        .bind(blobber_id)
        .bind(action.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateBlobber, CreateVideo, Database};

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let blobber = db
            .blobbers()
            .create(CreateBlobber {
                name: "nas".to_string(),
                secret: "s".to_string(),
            })
            .await
            .unwrap();
        db.videos()
            .create(CreateVideo {
                id: "v".to_string(),
                blobber_ids: vec![blobber],
            })
            .await
            .unwrap();
        (db, blobber)
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let (db, blobber) = setup().await;

        assert!(db.queue().insert_if_absent("v", blobber, QueueAction::FetchBlob).await.unwrap());
        assert!(!db.queue().insert_if_absent("v", blobber, QueueAction::FetchBlob).await.unwrap());
        // A different action is a different ticket
        assert!(db.queue().insert_if_absent("v", blobber, QueueAction::RemoveBlob).await.unwrap());

        let fetch = db.queue().list_for_blobber(blobber, QueueAction::FetchBlob).await.unwrap();
        assert_eq!(fetch.len(), 1);
        assert_eq!(fetch[0].video_id, "v");
        let remove = db.queue().list_for_blobber(blobber, QueueAction::RemoveBlob).await.unwrap();
        assert_eq!(remove.len(), 1);
    }

    #[tokio::test]
    async fn test_find_and_remove() {
        let (db, blobber) = setup().await;

        assert!(db.queue().find_entry("v", blobber, QueueAction::FetchBlob).await.unwrap().is_none());
        db.queue().insert_if_absent("v", blobber, QueueAction::FetchBlob).await.unwrap();
        let entry = db
            .queue()
            .find_entry("v", blobber, QueueAction::FetchBlob)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.action, QueueAction::FetchBlob);

        assert!(db.queue().remove("v", blobber, QueueAction::FetchBlob).await.unwrap());
        assert!(!db.queue().remove("v", blobber, QueueAction::FetchBlob).await.unwrap());
    }
}
