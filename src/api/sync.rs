use crate::api::middleware::RequireToken;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::services::SyncStatus;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;

pub fn sync_routes() -> Router<Arc<AppState>> {
    Router::new().route("/sync", get(status).post(start).delete(cancel))
}

async fn start(_: RequireToken, State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    state.sync.start()?;
    Ok(StatusCode::ACCEPTED)
}

async fn status(_: RequireToken, State(state): State<Arc<AppState>>) -> Json<SyncStatus> {
    Json(state.sync.status())
}

async fn cancel(_: RequireToken, State(state): State<Arc<AppState>>) -> Result<StatusCode> {
    if !state.sync.cancel() {
        return Err(AppError::NotFound("No import is running".to_string()));
    }
    Ok(StatusCode::ACCEPTED)
}
