//! YouTube Data API v3 client
//!
//! Only the `videos.list` endpoint is used. Every request goes through the
//! shared rate limiter, and transient failures are retried with backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::services::metadata::{MetadataError, MetadataSource, VideoMetadata};
use crate::services::rate_limiter::{
    RateLimitConfig, RateLimitedClient, RetryPolicy, is_retryable_status, retry_transient,
};

const VIDEO_PARTS: &str = "contentDetails,id,snippet,statistics,status";

/// YouTube Data API client
pub struct YouTubeClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    #[allow(dead_code)]
    id: String,
    snippet: Option<Snippet>,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
    status: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    #[serde(default)]
    duration: String,
    content_rating: Option<ContentRating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentRating {
    yt_rating: Option<String>,
}

/// Counters arrive as decimal strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    privacy_status: Option<String>,
    #[serde(default)]
    made_for_kids: bool,
}

fn parse_count(video_id: &str, name: &str, raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(video_id = %video_id, counter = name, value = raw, error = %e, "Cannot parse counter");
            None
        }
    }
}

impl VideoItem {
    fn into_metadata(self, video_id: &str) -> VideoMetadata {
        let snippet = self.snippet.unwrap_or_default();

        let published_at = snippet.published_at.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(e) => {
                    warn!(video_id = %video_id, value = raw, error = %e, "Cannot parse published at");
                    None
                }
            }
        });

        let (duration, yt_rating) = match self.content_details {
            Some(details) => (
                Some(details.duration),
                details.content_rating.and_then(|r| r.yt_rating),
            ),
            None => (None, None),
        };

        let (view_count, like_count, comment_count) = match &self.statistics {
            Some(stats) => (
                parse_count(video_id, "views", stats.view_count.as_deref()),
                parse_count(video_id, "likes", stats.like_count.as_deref()),
                parse_count(video_id, "comments", stats.comment_count.as_deref()),
            ),
            None => (None, None, None),
        };

        let (privacy, made_for_kids) = match self.status {
            Some(status) => (status.privacy_status, status.made_for_kids),
            None => (None, false),
        };

        VideoMetadata {
            channel_id: snippet.channel_id,
            title: snippet.title,
            description: snippet.description,
            tags: snippet.tags,
            published_at,
            duration,
            privacy,
            made_for_kids,
            yt_rating,
            view_count,
            like_count,
            comment_count,
        }
    }
}

impl YouTubeClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        rate_limit: RateLimitConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new("youtube", rate_limit)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    async fn list_video(&self, video_id: &str) -> Result<VideoListResponse, MetadataError> {
        let url = format!("{}/videos", self.base_url);
        let query = [
            ("part", VIDEO_PARTS),
            ("id", video_id),
            ("key", self.api_key.as_str()),
        ];

        let client = &self.client;
        let url = url.as_str();
        let query = &query;

        let response = retry_transient(&self.retry, video_id, || async move {
            let response = client
                .get_with_query(url, query)
                .await
                .map_err(|e| MetadataError::Transient(format!("{:#}", e)))?;
            if is_retryable_status(response.status()) {
                return Err(MetadataError::Transient(format!(
                    "YouTube returned {}",
                    response.status()
                )));
            }
            Ok(response)
        })
        .await?;

        // 403 is how the API reports an exhausted daily quota
        if !response.status().is_success() {
            return Err(MetadataError::Transient(format!(
                "YouTube returned {}",
                response.status()
            )));
        }

        response
            .json::<VideoListResponse>()
            .await
            .map_err(|e| MetadataError::Transient(format!("Malformed YouTube response: {}", e)))
    }
}

#[async_trait]
impl MetadataSource for YouTubeClient {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata, MetadataError> {
        debug!(video_id = %video_id, "Fetching video metadata from YouTube");

        let body = self.list_video(video_id).await?;
        let item = body
            .items
            .into_iter()
            .next()
            .ok_or(MetadataError::NotFound)?;

        Ok(item.into_metadata(video_id))
    }
}
