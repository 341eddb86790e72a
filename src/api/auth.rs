use crate::api::middleware::RequireToken;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{LoginRequest, SessionInfo};
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;
use validator::Validate;

pub fn lastfm_routes() -> Router<Arc<AppState>> {
    Router::new().route("/login", post(login))
}

/// Exchanges Last.fm credentials for a session key. The password is not kept.
async fn login(
    _: RequireToken,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionInfo>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = state.lastfm.request_session(&req.username, &req.password).await?;
    tracing::info!("Authenticated Last.fm user {}", session.name);
    Ok(Json(session))
}
