//! Blobber agent database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{decode_err, str_to_datetime};

/// Blobber record from database
#[derive(Clone)]
pub struct BlobberRecord {
    pub id: i64,
    pub name: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for BlobberRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobberRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for BlobberRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let created_str: String = row.try_get("created_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            secret: row.try_get("secret")?,
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
        })
    }
}

/// Input for registering a blobber
#[derive(Debug)]
pub struct CreateBlobber {
    pub name: String,
    pub secret: String,
}

pub struct BlobberRepository {
    pool: SqlitePool,
}

impl BlobberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a blobber and return its identifier
    pub async fn create(&self, input: CreateBlobber) -> Result<i64> {
        let result = sqlx::query("INSERT INTO blobbers (name, secret) VALUES (?1, ?2)")
            .bind(&input.name)
            .bind(&input.secret)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<BlobberRecord>> {
        let record = sqlx::query_as::<_, BlobberRecord>(
            "SELECT id, name, secret, created_at FROM blobbers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Look up a blobber by id and shared secret
    pub async fn authenticate(&self, id: i64, secret: &str) -> Result<Option<BlobberRecord>> {
        let record = sqlx::query_as::<_, BlobberRecord>(
            "SELECT id, name, secret, created_at FROM blobbers WHERE id = ?1 AND secret = ?2",
        )
        .bind(id)
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Associate a blobber with a video. Returns false if already associated.
    pub async fn assign(&self, video_id: &str, blobber_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO video_blobbers (video_id, blobber_id)
            VALUES (?1, ?2)
            ON CONFLICT (video_id, blobber_id) DO NOTHING
            "#,
        )
        .bind(video_id)
        .bind(blobber_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the association between a blobber and a video
    pub async fn unassign(&self, video_id: &str, blobber_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM video_blobbers WHERE video_id = ?1 AND blobber_id = ?2")
                .bind(video_id)
                .bind(blobber_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get the identifiers of all blobbers associated with a video
    pub async fn ids_for_video(&self, video_id: &str) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT blobber_id FROM video_blobbers WHERE video_id = ?1 ORDER BY blobber_id",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
