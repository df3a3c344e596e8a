//! In-process metadata sources and seed helpers for refresh tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::db::videos::write_refreshed;
use crate::db::{CreateVideo, Database, VideoRating, VideoRecord};
use crate::services::metadata::AGE_RESTRICTED_RATING;
use crate::services::{MetadataError, MetadataSource, VideoMetadata};

/// Answers every fetch from a per-video script
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, Result<VideoMetadata, MetadataError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, video_id: &str, response: Result<VideoMetadata, MetadataError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(video_id.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for ScriptedSource {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .unwrap_or_else(|| Err(MetadataError::Transient(format!("no script for {}", video_id))))
    }
}

/// Never answers
pub struct PendingSource;

#[async_trait]
impl MetadataSource for PendingSource {
    async fn fetch(&self, _video_id: &str) -> Result<VideoMetadata, MetadataError> {
        std::future::pending().await
    }
}

/// Metadata the source would return for an unchanged video
pub fn metadata_matching(video: &VideoRecord) -> VideoMetadata {
    VideoMetadata {
        channel_id: video.channel_id.clone(),
        title: video.title.clone(),
        description: video.description.clone(),
        tags: if video.tags.is_empty() {
            Vec::new()
        } else {
            video.tags.split(',').map(str::to_string).collect()
        },
        published_at: video.published_at,
        duration: Some(video.video_length.clone()),
        privacy: Some(video.privacy_status.as_key().to_string()),
        made_for_kids: video.rating == VideoRating::Kids,
        yt_rating: (video.rating == VideoRating::AgeRestricted)
            .then(|| AGE_RESTRICTED_RATING.to_string()),
        view_count: Some(video.view_count),
        like_count: Some(video.like_count),
        comment_count: Some(video.comment_count),
    }
}

/// Register a video that has never been fetched
pub async fn create_video(db: &Database, id: &str) -> VideoRecord {
    db.videos()
        .create(CreateVideo {
            id: id.to_string(),
            blobber_ids: vec![],
        })
        .await
        .unwrap()
}

/// Register a video that already went through one refresh
pub async fn seed_fetched<F>(db: &Database, id: &str, customize: F) -> VideoRecord
where
    F: FnOnce(&mut VideoRecord),
{
    let mut video = create_video(db, id).await;
    video.channel_id = "UCchannel".to_string();
    video.title = format!("Title of {}", id);
    video.description = "Description".to_string();
    video.tags = "penguin,ice".to_string();
    video.video_length = "PT5M".to_string();
    video.view_count = 100;
    video.like_count = 10;
    video.comment_count = 2;
    video.fetched = true;
    video.last_updated = Some(Utc::now());
    customize(&mut video);

    write_refreshed(db.pool(), &video).await.unwrap();
    db.videos().find_by_id(id).await.unwrap().unwrap()
}
