mod api;
mod config;
mod error;
mod models;
mod services;

use crate::api::AppState;
use crate::config::Config;
use crate::services::{
    EventHub, ImportLovedTracksJob, LastfmClient, LovedTracksPaginator, NavidromeClient, Scrobbler,
    SyncController, SyncScope, UserStore,
};
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,lastfm_bridge=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let users = Arc::new(UserStore::load(&config.users_file)?);
    if users.with_session().is_empty() {
        tracing::warn!("No users have a Last.fm session, nothing will be scrobbled");
    }

    // Initialize services
    let lastfm = Arc::new(LastfmClient::new(
        config.lastfm_api_key.clone(),
        config.lastfm_api_secret.clone(),
        &config.lastfm_api_host,
    ));

    let hub = EventHub::new();
    let sync_scope = SyncScope::new();
    let navidrome = Arc::new(
        NavidromeClient::new(config.navidrome_url.clone())
            .with_events(hub.publisher())
            .with_sync_scope(sync_scope.clone()),
    );

    hub.register(Arc::new(Scrobbler::new(
        lastfm.clone(),
        users.clone(),
        sync_scope.clone(),
    )));
    hub.start().await;

    let job = ImportLovedTracksJob::new(
        users.clone(),
        navidrome,
        LovedTracksPaginator::new(lastfm.clone(), config.loved_tracks_page_size),
        sync_scope,
    );
    let sync = SyncController::new(job);

    let scheduler = config.sync_interval.map(|every| {
        tracing::info!("Importing loved tracks every {} hours", every.as_secs() / 3600);
        sync.spawn_schedule(every)
    });

    let app_state = Arc::new(AppState {
        bridge_token: config.bridge_token.clone(),
        lastfm,
        events: hub.publisher(),
        sync: sync.clone(),
    });

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    // Build router
    let app = Router::new()
        .nest("/api/v1", api::api_routes(app_state))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            cors.allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the job before the hub so no new events arrive during teardown
    tracing::info!("Shutting down");
    sync.shutdown().await;
    if let Some(scheduler) = scheduler {
        scheduler.await.ok();
    }
    hub.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
