//! Blobber registration and queue pull endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::app::AppState;
use crate::db::{CreateBlobber, QueueAction};

/// Header carrying the blobber's shared secret
pub const SECRET_HEADER: &str = "Blobber-Secret";

#[derive(Debug, Deserialize)]
pub struct AddBlobberRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct AddBlobberResponse {
    pub id: i64,
}

/// Work waiting for a blobber
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullResponse {
    pub download: Vec<String>,
    pub remove: Vec<String>,
}

async fn add_blobber(
    State(state): State<AppState>,
    Json(body): Json<AddBlobberRequest>,
) -> ApiResult<(StatusCode, Json<AddBlobberResponse>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name required".to_string()));
    }
    if body.secret.is_empty() {
        return Err(ApiError::BadRequest("secret required".to_string()));
    }

    let id = state
        .db
        .blobbers()
        .create(CreateBlobber {
            name: body.name,
            secret: body.secret,
        })
        .await?;

    info!(blobber_id = id, "Blobber registered");
    Ok((StatusCode::CREATED, Json(AddBlobberResponse { id })))
}

/// List the videos a blobber should fetch and remove
async fn pull(
    State(state): State<AppState>,
    Path(blobber_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Json<PullResponse>> {
    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing blobber secret".to_string()))?;

    if state
        .db
        .blobbers()
        .authenticate(blobber_id, secret)
        .await?
        .is_none()
    {
        return Err(ApiError::Unauthorized(
            "Invalid blobber id or secret".to_string(),
        ));
    }

    let queue = state.db.queue();
    let download = queue
        .list_for_blobber(blobber_id, QueueAction::FetchBlob)
        .await?;
    let remove = queue
        .list_for_blobber(blobber_id, QueueAction::RemoveBlob)
        .await?;

    debug!(
        blobber_id,
        download = download.len(),
        remove = remove.len(),
        "Blobber pulled queue"
    );

    Ok(Json(PullResponse {
        download: download.into_iter().map(|e| e.video_id).collect(),
        remove: remove.into_iter().map(|e| e.video_id).collect(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blobber", post(add_blobber))
        .route("/blobber/{blobber_id}/pull", get(pull))
}
