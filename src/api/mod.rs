//! REST control-plane and blobber endpoints

pub mod blobbers;
pub mod error;
pub mod health;
pub mod videos;

use axum::Router;

use crate::app::AppState;

pub use error::{ApiError, ApiResult};

/// All routes served by the REST API
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(videos::router())
        .merge(blobbers::router())
}
