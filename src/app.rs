//! Application state and HTTP router construction

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::Database;

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

/// Build the full Axum router with layers applied
pub fn build_app(state: AppState) -> Router<()> {
    crate::api::router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// State backed by a fresh in-memory database
#[cfg(test)]
pub async fn test_state() -> AppState {
    AppState {
        db: Database::in_memory().await.unwrap(),
    }
}
