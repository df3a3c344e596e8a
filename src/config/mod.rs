//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Output format of the console log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Address the REST server binds to
    pub host: String,

    /// REST server port
    pub port: u16,

    /// SQLite connection URL
    pub database_url: String,

    /// Maximum connections in the SQLite pool
    pub database_max_connections: u32,

    /// YouTube Data API v3 key
    pub youtube_api_key: String,

    /// YouTube Data API base URL
    pub youtube_api_url: String,

    /// Sustained request rate towards the YouTube API
    pub youtube_requests_per_second: u32,

    /// Burst allowance above the sustained rate
    pub youtube_burst: u32,

    /// Cron expression (with seconds) for the metadata refresh cycle
    pub refresh_cron: String,

    /// Number of concurrent refresh workers
    pub refresh_workers: usize,

    /// Console log format
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("youtube_api_key", &"<redacted>")
            .field("youtube_api_url", &self.youtube_api_url)
            .field("youtube_requests_per_second", &self.youtube_requests_per_second)
            .field("youtube_burst", &self.youtube_burst)
            .field("refresh_cron", &self.refresh_cron)
            .field("refresh_workers", &self.refresh_workers)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Prefer DATABASE_URL, fall back to a plain DATABASE_PATH
        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("DATABASE_PATH").map(|p| format!("sqlite:{}", p)))
            .unwrap_or_else(|| "sqlite:./data/penguin.db".to_string());

        let youtube_api_key = lookup("YOUTUBE_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .context("YOUTUBE_API_KEY (or API_KEY) is required")?;

        let refresh_workers: usize = lookup("REFRESH_WORKERS")
            .unwrap_or_else(|| "8".to_string())
            .parse()
            .context("Invalid REFRESH_WORKERS")?;
        if refresh_workers == 0 {
            anyhow::bail!("REFRESH_WORKERS must be at least 1");
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port: lookup("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            youtube_api_key,

            youtube_api_url: lookup("YOUTUBE_API_URL")
                .unwrap_or_else(|| "https://www.googleapis.com/youtube/v3".to_string()),

            youtube_requests_per_second: lookup("YOUTUBE_REQUESTS_PER_SECOND")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            youtube_burst: lookup("YOUTUBE_BURST")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            refresh_cron: lookup("REFRESH_CRON").unwrap_or_else(|| "0 * * * * *".to_string()),

            refresh_workers,

            log_format,
        })
    }
}
