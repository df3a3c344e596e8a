//! Metadata source abstraction used by the refresh engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{PrivacyStatus, VideoRating};

/// Value of the source's `ytRating` content rating for age restricted videos
pub const AGE_RESTRICTED_RATING: &str = "ytAgeRestricted";

/// Metadata of one video as reported by the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    /// Empty when the source did not report a channel
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// ISO 8601 duration. `None` when content details were not reported.
    pub duration: Option<String>,
    /// Raw privacy key ("public", "private", "unlisted")
    pub privacy: Option<String>,
    pub made_for_kids: bool,
    pub yt_rating: Option<String>,
    /// Counters are `None` when statistics were not reported
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
}

impl VideoMetadata {
    /// Rating derived from the audience and content rating flags.
    /// Made for kids wins over an age restriction.
    pub fn rating(&self) -> VideoRating {
        if self.made_for_kids {
            VideoRating::Kids
        } else if self.yt_rating.as_deref() == Some(AGE_RESTRICTED_RATING) {
            VideoRating::AgeRestricted
        } else {
            VideoRating::Normal
        }
    }

    /// Known privacy status, if the source reported one
    pub fn privacy_status(&self) -> Option<PrivacyStatus> {
        self.privacy.as_deref().and_then(PrivacyStatus::from_key)
    }

    /// Tags joined the way they are stored
    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The source has no record for the video
    #[error("video not found at metadata source")]
    NotFound,

    /// Network failure, quota exhaustion, server error or malformed response
    #[error("metadata source unavailable: {0}")]
    Transient(String),
}

/// Source of video metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata, MetadataError>;
}
