//! Video catalog database repository

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::sqlite_helpers::{
    bool_to_int, datetime_opt_to_str, decode_err, int_to_bool, str_to_datetime,
    str_to_datetime_opt,
};

/// Content rating of a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoRating {
    Normal,
    Kids,
    AgeRestricted,
}

impl VideoRating {
    /// Stable integer code used for persistence and history rows
    pub fn code(self) -> i64 {
        match self {
            Self::Normal => 1,
            Self::Kids => 2,
            Self::AgeRestricted => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Normal),
            2 => Some(Self::Kids),
            3 => Some(Self::AgeRestricted),
            _ => None,
        }
    }
}

/// Privacy status of a video on the source platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyStatus {
    Public,
    Private,
    Unlisted,
}

impl PrivacyStatus {
    /// Stable integer code used for persistence and history rows
    pub fn code(self) -> i64 {
        match self {
            Self::Public => 1,
            Self::Private => 2,
            Self::Unlisted => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Public),
            2 => Some(Self::Private),
            3 => Some(Self::Unlisted),
            _ => None,
        }
    }

    /// Map the source API's privacy key ("public", "private", "unlisted")
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "unlisted" => Some(Self::Unlisted),
            _ => None,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Unlisted => "unlisted",
        }
    }
}

/// Video record from database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    /// Comma-joined tag list
    pub tags: String,
    /// ISO 8601 duration as reported by the source (e.g. `PT5M`)
    pub video_length: String,
    pub rating: VideoRating,
    pub published_at: Option<DateTime<Utc>>,
    pub privacy_status: PrivacyStatus,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    /// Set after the first successful metadata refresh
    pub fetched: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// A redownload verdict whose fetch tickets have not all been queued yet
    pub pending_download: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for VideoRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let rating_code: i64 = row.try_get("rating")?;
        let privacy_code: i64 = row.try_get("privacy_status")?;
        let published_str: Option<String> = row.try_get("published_at")?;
        let last_updated_str: Option<String> = row.try_get("last_updated")?;
        let created_str: String = row.try_get("created_at")?;
        let fetched_int: i32 = row.try_get("fetched")?;
        let pending_int: i32 = row.try_get("pending_download")?;
        let active_int: i32 = row.try_get("active")?;

        Ok(Self {
            id: row.try_get("id")?,
            channel_id: row.try_get("channel_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            tags: row.try_get("tags")?,
            video_length: row.try_get("video_length")?,
            rating: VideoRating::from_code(rating_code)
                .ok_or_else(|| decode_err(anyhow!("Unknown rating code {}", rating_code)))?,
            published_at: str_to_datetime_opt(published_str.as_deref()).map_err(decode_err)?,
            privacy_status: PrivacyStatus::from_code(privacy_code)
                .ok_or_else(|| decode_err(anyhow!("Unknown privacy code {}", privacy_code)))?,
            view_count: row.try_get("view_count")?,
            like_count: row.try_get("like_count")?,
            comment_count: row.try_get("comment_count")?,
            fetched: int_to_bool(fetched_int),
            last_updated: str_to_datetime_opt(last_updated_str.as_deref()).map_err(decode_err)?,
            pending_download: int_to_bool(pending_int),
            active: int_to_bool(active_int),
            created_at: str_to_datetime(&created_str).map_err(decode_err)?,
        })
    }
}

/// Input for registering a video
#[derive(Debug)]
pub struct CreateVideo {
    pub id: String,
    pub blobber_ids: Vec<i64>,
}

const VIDEO_COLUMNS: &str = r#"
    id, channel_id, title, description, tags, video_length, rating,
    published_at, privacy_status, view_count, like_count, comment_count,
    fetched, last_updated, pending_download, active, created_at
"#;

/// Persist the refreshed metadata of a video.
///
/// Leaves `active` untouched; that flag belongs to the control-plane.
pub async fn write_refreshed<'e, E>(executor: E, video: &VideoRecord) -> sqlx::Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE videos SET
            channel_id = ?2,
            title = ?3,
            description = ?4,
            tags = ?5,
            video_length = ?6,
            rating = ?7,
            published_at = ?8,
            privacy_status = ?9,
            view_count = ?10,
            like_count = ?11,
            comment_count = ?12,
            fetched = ?13,
            last_updated = ?14,
            pending_download = ?15
        WHERE id = ?1
        "#,
    )
    .bind(&video.id)
    .bind(&video.channel_id)
    .bind(&video.title)
    .bind(&video.description)
    .bind(&video.tags)
    .bind(&video.video_length)
    .bind(video.rating.code())
    .bind(datetime_opt_to_str(video.published_at))
    .bind(video.privacy_status.code())
    .bind(video.view_count)
    .bind(video.like_count)
    .bind(video.comment_count)
    .bind(bool_to_int(video.fetched))
    .bind(datetime_opt_to_str(video.last_updated))
    .bind(bool_to_int(video.pending_download))
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub struct VideoRepository {
    pool: SqlitePool,
}

impl VideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get every video currently marked active
    pub async fn list_active(&self) -> Result<Vec<VideoRecord>> {
        let records = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE active = 1 ORDER BY created_at, id",
            VIDEO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get a video by its source identifier
    pub async fn find_by_id(&self, id: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE id = ?1",
            VIDEO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Register a new, active and not yet fetched video together with its blobbers
    pub async fn create(&self, input: CreateVideo) -> Result<VideoRecord> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO videos (id, active) VALUES (?1, 1)")
            .bind(&input.id)
            .execute(&mut *tx)
            .await?;

        for blobber_id in &input.blobber_ids {
            sqlx::query(
                r#"
                INSERT INTO video_blobbers (video_id, blobber_id)
                VALUES (?1, ?2)
                ON CONFLICT (video_id, blobber_id) DO NOTHING
                "#,
            )
            .bind(&input.id)
            .bind(blobber_id)
            .execute(&mut *tx)
            .await?;
        }

        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE id = ?1",
            VIDEO_COLUMNS
        ))
        .bind(&input.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Enable or disable a video. Returns false if the video does not exist
    /// or already is in the requested state.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET active = ?2 WHERE id = ?1 AND active != ?2")
            .bind(id)
            .bind(bool_to_int(active))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the redownload verdict of a video as fully queued
    pub async fn clear_pending_download(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE videos SET pending_download = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
