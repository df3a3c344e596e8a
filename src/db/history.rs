//! Append-only field history and counter snapshot series

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::sqlite_helpers::{datetime_to_str, decode_err, str_to_datetime};

/// One of the three tracked statistics, each with its own series table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Views,
    Likes,
    Comments,
}

impl CounterKind {
    fn table(self) -> &'static str {
        match self {
            Self::Views => "video_view_history",
            Self::Likes => "video_like_history",
            Self::Comments => "video_comment_history",
        }
    }
}

/// Field history row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoHistoryRecord {
    pub id: i64,
    pub video_id: String,
    pub field: String,
    pub old: String,
    pub new: String,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for VideoHistoryRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let updated_str: String = row.try_get("updated_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            video_id: row.try_get("video_id")?,
            field: row.try_get("field")?,
            old: row.try_get("old")?,
            new: row.try_get("new")?,
            updated_at: str_to_datetime(&updated_str).map_err(decode_err)?,
        })
    }
}

/// Counter snapshot row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSnapshotRecord {
    pub id: i64,
    pub video_id: String,
    pub value: i64,
    pub recorded_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CounterSnapshotRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let recorded_str: String = row.try_get("recorded_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            video_id: row.try_get("video_id")?,
            value: row.try_get("value")?,
            recorded_at: str_to_datetime(&recorded_str).map_err(decode_err)?,
        })
    }
}

/// Input for a field history row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVideoHistory {
    pub video_id: String,
    pub field: String,
    pub old: String,
    pub new: String,
    pub updated_at: DateTime<Utc>,
}

/// Input for a counter snapshot row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCounterSnapshot {
    pub kind: CounterKind,
    pub video_id: String,
    pub value: i64,
    pub recorded_at: DateTime<Utc>,
}

pub async fn insert_history<'e, E>(executor: E, input: &CreateVideoHistory) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO video_history (video_id, field, old, new, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&input.video_id)
    .bind(&input.field)
    .bind(&input.old)
    .bind(&input.new)
    .bind(datetime_to_str(input.updated_at))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_counter_snapshot<'e, E>(
    executor: E,
    input: &CreateCounterSnapshot,
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    // Table name comes from a closed enum, never from input
    let sql = format!(
        "INSERT INTO {} (video_id, value, recorded_at) VALUES (?1, ?2, ?3)",
        input.kind.table()
    );
    sqlx::query(&sql)
        .bind(&input.video_id)
        .bind(input.value)
        .bind(datetime_to_str(input.recorded_at))
        .execute(executor)
        .await?;

    Ok(())
}

pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the field history of a video, newest first
    pub async fn list_for_video(&self, video_id: &str) -> Result<Vec<VideoHistoryRecord>> {
        let records = sqlx::query_as::<_, VideoHistoryRecord>(
            r#"
            SELECT id, video_id, field, old, new, updated_at
            FROM video_history
            WHERE video_id = ?1
            ORDER BY id DESC
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Get one counter series of a video in recording order
    pub async fn counter_series(
        &self,
        kind: CounterKind,
        video_id: &str,
    ) -> Result<Vec<CounterSnapshotRecord>> {
        let sql = format!(
            "SELECT id, video_id, value, recorded_at FROM {} WHERE video_id = ?1 ORDER BY id",
            kind.table()
        );
        let records = sqlx::query_as::<_, CounterSnapshotRecord>(&sql)
            .bind(video_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}
