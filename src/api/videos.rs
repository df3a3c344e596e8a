//! Video catalog control-plane endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::db::{
    CounterKind, CounterSnapshotRecord, CreateVideo, QueueAction, VideoHistoryRecord, VideoRecord,
};

#[derive(Debug, Deserialize)]
pub struct AddVideoRequest {
    #[serde(rename = "videoID")]
    pub video_id: String,
    #[serde(default)]
    pub blobbers: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    #[default]
    Disable,
    Enable,
}

#[derive(Debug, Deserialize)]
pub struct VideoStateQuery {
    #[serde(default)]
    pub state: VideoState,
}

#[derive(Debug, Serialize)]
pub struct VideoStateResponse {
    pub video_id: String,
    pub active: bool,
}

/// Recorded statistics of a video, oldest first
#[derive(Debug, Serialize)]
pub struct CounterSeriesResponse {
    pub views: Vec<CounterSnapshotRecord>,
    pub likes: Vec<CounterSnapshotRecord>,
    pub comments: Vec<CounterSnapshotRecord>,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub video_id: String,
    pub blobber_id: i64,
    pub queued: bool,
}

async fn require_video(state: &AppState, video_id: &str) -> ApiResult<VideoRecord> {
    state
        .db
        .videos()
        .find_by_id(video_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Video {} not found", video_id)))
}

async fn require_blobber(state: &AppState, blobber_id: i64) -> ApiResult<()> {
    state
        .db
        .blobbers()
        .find_by_id(blobber_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("Blobber {} not found", blobber_id)))
}

/// Register a video together with the blobbers that should hold it
async fn add_video(
    State(state): State<AppState>,
    Json(body): Json<AddVideoRequest>,
) -> ApiResult<(StatusCode, Json<VideoRecord>)> {
    let video_id = body.video_id.trim().to_string();
    if video_id.is_empty() {
        return Err(ApiError::BadRequest("videoID is required".to_string()));
    }

    if state.db.videos().find_by_id(&video_id).await?.is_some() {
        return Err(ApiError::Conflict("Video already added".to_string()));
    }

    for blobber_id in &body.blobbers {
        require_blobber(&state, *blobber_id).await?;
    }

    let video = state
        .db
        .videos()
        .create(CreateVideo {
            id: video_id,
            blobber_ids: body.blobbers,
        })
        .await?;

    info!(video_id = %video.id, "Video added");
    Ok((StatusCode::CREATED, Json(video)))
}

/// Disable (default) or re-enable refreshing of a video
async fn set_video_state(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Query(query): Query<VideoStateQuery>,
) -> ApiResult<Json<VideoStateResponse>> {
    let active = query.state == VideoState::Enable;

    if !state.db.videos().set_active(&video_id, active).await? {
        return Err(ApiError::NotFound(format!(
            "Video {} not found or already in the requested state",
            video_id
        )));
    }

    info!(video_id = %video_id, active, "Video state changed");
    Ok(Json(VideoStateResponse { video_id, active }))
}

/// Attach a blobber to a video and hand it the initial fetch ticket
async fn add_video_blobber(
    State(state): State<AppState>,
    Path((video_id, blobber_id)): Path<(String, i64)>,
) -> ApiResult<(StatusCode, Json<AssignmentResponse>)> {
    require_video(&state, &video_id).await?;
    require_blobber(&state, blobber_id).await?;

    state.db.blobbers().assign(&video_id, blobber_id).await?;
    let queued = state
        .db
        .queue()
        .insert_if_absent(&video_id, blobber_id, QueueAction::FetchBlob)
        .await?;

    info!(video_id = %video_id, blobber_id, queued, "Blobber added to video");
    Ok((
        StatusCode::CREATED,
        Json(AssignmentResponse {
            video_id,
            blobber_id,
            queued,
        }),
    ))
}

/// Detach a blobber from a video and ask it to drop the assets
async fn remove_video_blobber(
    State(state): State<AppState>,
    Path((video_id, blobber_id)): Path<(String, i64)>,
) -> ApiResult<Json<AssignmentResponse>> {
    require_video(&state, &video_id).await?;
    require_blobber(&state, blobber_id).await?;

    if !state.db.blobbers().unassign(&video_id, blobber_id).await? {
        return Err(ApiError::NotFound(format!(
            "Blobber {} is not assigned to video {}",
            blobber_id, video_id
        )));
    }

    let queue = state.db.queue();
    queue
        .remove(&video_id, blobber_id, QueueAction::FetchBlob)
        .await?;
    let queued = queue
        .insert_if_absent(&video_id, blobber_id, QueueAction::RemoveBlob)
        .await?;

    info!(video_id = %video_id, blobber_id, "Blobber removed from video");
    Ok(Json(AssignmentResponse {
        video_id,
        blobber_id,
        queued,
    }))
}

/// Field history of a video, newest first
async fn video_history(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<Vec<VideoHistoryRecord>>> {
    require_video(&state, &video_id).await?;
    Ok(Json(state.db.history().list_for_video(&video_id).await?))
}

async fn video_counters(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<CounterSeriesResponse>> {
    require_video(&state, &video_id).await?;

    let history = state.db.history();
    Ok(Json(CounterSeriesResponse {
        views: history.counter_series(CounterKind::Views, &video_id).await?,
        likes: history.counter_series(CounterKind::Likes, &video_id).await?,
        comments: history
            .counter_series(CounterKind::Comments, &video_id)
            .await?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/media/video", post(add_video))
        .route("/media/video/{video_id}", delete(set_video_state))
        .route("/media/video/{video_id}/history", get(video_history))
        .route("/media/video/{video_id}/counters", get(video_counters))
        .route(
            "/media/video/{video_id}/blobber/{blobber_id}",
            post(add_video_blobber).delete(remove_video_blobber),
        )
}
