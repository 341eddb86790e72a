use crate::api::middleware::RequireToken;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{MediaEvent, PlaybackEvent, UserDataSaved};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;

/// Webhooks the media server calls. Handling happens on the event hub.
pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/playback-start", post(playback_start))
        .route("/playback-stop", post(playback_stop))
        .route("/user-data", post(user_data))
}

async fn playback_start(
    _: RequireToken,
    State(state): State<Arc<AppState>>,
    Json(event): Json<PlaybackEvent>,
) -> Result<StatusCode> {
    accept(&state, MediaEvent::PlaybackStarted(event))
}

async fn playback_stop(
    _: RequireToken,
    State(state): State<Arc<AppState>>,
    Json(event): Json<PlaybackEvent>,
) -> Result<StatusCode> {
    accept(&state, MediaEvent::PlaybackStopped(event))
}

async fn user_data(
    _: RequireToken,
    State(state): State<Arc<AppState>>,
    Json(event): Json<UserDataSaved>,
) -> Result<StatusCode> {
    accept(&state, MediaEvent::UserDataSaved(event))
}

fn accept(state: &AppState, event: MediaEvent) -> Result<StatusCode> {
    if !state.events.publish(event) {
        return Err(AppError::Internal(anyhow::anyhow!("Event hub is shut down")));
    }
    Ok(StatusCode::ACCEPTED)
}
