//! Static schema for the catalog, history, and blobber queue tables.
//!
//! Every statement is idempotent so the schema can be applied on each startup.

use sqlx::SqlitePool;
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "videos",
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY NOT NULL,
            channel_id TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            video_length TEXT NOT NULL DEFAULT '',
            rating INTEGER NOT NULL DEFAULT 1,
            published_at TEXT,
            privacy_status INTEGER NOT NULL DEFAULT 1,
            view_count INTEGER NOT NULL DEFAULT 0,
            like_count INTEGER NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            fetched INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT,
            pending_download INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    ),
    (
        "idx_videos_active",
        "CREATE INDEX IF NOT EXISTS idx_videos_active ON videos(active)",
    ),
    (
        "video_history",
        r#"
        CREATE TABLE IF NOT EXISTS video_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES videos(id),
            field TEXT NOT NULL,
            old TEXT NOT NULL,
            new TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "idx_video_history_video",
        "CREATE INDEX IF NOT EXISTS idx_video_history_video ON video_history(video_id)",
    ),
    (
        "video_view_history",
        r#"
        CREATE TABLE IF NOT EXISTS video_view_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES videos(id),
            value INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "video_like_history",
        r#"
        CREATE TABLE IF NOT EXISTS video_like_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES videos(id),
            value INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "video_comment_history",
        r#"
        CREATE TABLE IF NOT EXISTS video_comment_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES videos(id),
            value INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "blobbers",
        r#"
        CREATE TABLE IF NOT EXISTS blobbers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            secret TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    ),
    (
        "video_blobbers",
        r#"
        CREATE TABLE IF NOT EXISTS video_blobbers (
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            blobber_id INTEGER NOT NULL REFERENCES blobbers(id) ON DELETE CASCADE,
            PRIMARY KEY (video_id, blobber_id)
        )
        "#,
    ),
    (
        "blob_queue",
        r#"
        CREATE TABLE IF NOT EXISTS blob_queue (
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            blobber_id INTEGER NOT NULL REFERENCES blobbers(id) ON DELETE CASCADE,
            action INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (video_id, blobber_id, action)
        )
        "#,
    ),
];

/// Columns introduced after a table was first shipped: (table, column, definition)
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[(
    "videos",
    "pending_download",
    "INTEGER NOT NULL DEFAULT 0",
)];

async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

/// Create all tables and indexes that do not exist yet, then add any
/// columns missing from tables created by an older build
pub async fn apply(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for (name, sql) in SCHEMA {
        debug!(object = %name, "Applying schema");
        sqlx::query(sql).execute(pool).await?;
    }

    for (table, column, definition) in ADDED_COLUMNS {
        if table_columns(pool, table).await?.iter().any(|c| c == column) {
            continue;
        }
        info!(table = %table, column = %column, "Adding missing column");
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, definition
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    #[tokio::test]
    async fn test_apply_upgrades_older_videos_table() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE videos (id TEXT PRIMARY KEY NOT NULL, active INTEGER NOT NULL DEFAULT 1)")
            .execute(&pool)
            .await
            .unwrap();

        apply(&pool).await.unwrap();
        // Applying twice is a no-op
        apply(&pool).await.unwrap();

        let columns = table_columns(&pool, "videos").await.unwrap();
        assert!(columns.iter().any(|c| c == "pending_download"));
    }
}
