//! Database connection and operations

pub mod blobbers;
pub mod history;
pub mod queue;
pub mod schema;
pub mod sqlite_helpers;
pub mod videos;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use blobbers::{BlobberRecord, BlobberRepository, CreateBlobber};
pub use history::{
    CounterKind, CounterSnapshotRecord, CreateCounterSnapshot, CreateVideoHistory,
    HistoryRepository, VideoHistoryRecord,
};
pub use queue::{QueueAction, QueueEntry, QueueRepository};
pub use videos::{CreateVideo, PrivacyStatus, VideoRating, VideoRecord, VideoRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    ///
    /// The parent directory of a file-backed database is created when missing.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL '{}'", url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        if let Some(parent) = options.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Ok(Self { pool })
    }

    /// Open a private in-memory database with the schema applied
    ///
    /// Every SQLite connection to `:memory:` is a separate database, so the
    /// pool is pinned to one connection that never expires.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self::new(pool);
        db.migrate().await?;
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a video catalog repository
    pub fn videos(&self) -> VideoRepository {
        VideoRepository::new(self.pool.clone())
    }

    /// Get a field and counter history repository
    pub fn history(&self) -> HistoryRepository {
        HistoryRepository::new(self.pool.clone())
    }

    /// Get a blobber repository
    pub fn blobbers(&self) -> BlobberRepository {
        BlobberRepository::new(self.pool.clone())
    }

    /// Get a blobber work queue repository
    pub fn queue(&self) -> QueueRepository {
        QueueRepository::new(self.pool.clone())
    }

    /// Create any missing tables
    pub async fn migrate(&self) -> Result<()> {
        schema::apply(&self.pool)
            .await
            .context("Failed to apply database schema")?;
        Ok(())
    }
}
