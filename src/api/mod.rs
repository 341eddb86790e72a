pub mod auth;
pub mod events;
pub mod middleware;
pub mod sync;

use crate::services::{EventPublisher, LastfmApi, SyncController};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub use auth::lastfm_routes;
pub use events::event_routes;
pub use sync::sync_routes;

pub struct AppState {
    pub bridge_token: String,
    pub lastfm: Arc<dyn LastfmApi>,
    pub events: EventPublisher,
    pub sync: SyncController,
}

/// Every route under `/api/v1`.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/lastfm", lastfm_routes())
        .nest("/events", event_routes())
        .merge(sync_routes())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
