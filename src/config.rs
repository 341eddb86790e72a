use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::lastfm::MAX_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub lastfm_api_key: String,
    pub lastfm_api_secret: String,
    pub lastfm_api_host: String,
    pub navidrome_url: String,
    /// JSON file with the linked account mappings.
    pub users_file: PathBuf,
    pub bridge_token: String,
    pub server_host: String,
    pub server_port: u16,
    /// Run the loved tracks import on this interval when set.
    pub sync_interval: Option<Duration>,
    pub loved_tracks_page_size: u32,
    /// Allowed CORS origins (comma-separated). Use "*" for any origin (development only).
    pub cors_origins: Vec<String>,
}

fn required(name: &str) -> Result<String, anyhow::Error> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable must be set", name))
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        // BRIDGE_TOKEN guards every write endpoint - no insecure defaults
        let bridge_token = required("BRIDGE_TOKEN")?;
        if bridge_token.len() < 16 {
            return Err(anyhow::anyhow!(
                "BRIDGE_TOKEN must be at least 16 characters long. \
                Generate one with: openssl rand -base64 24"
            ));
        }

        let sync_interval = match env::var("SYNC_INTERVAL_HOURS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let hours: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("SYNC_INTERVAL_HOURS must be a whole number"))?;
                (hours > 0).then(|| Duration::from_secs(hours * 3600))
            }
            _ => None,
        };

        // Parse CORS origins - default to localhost for development
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            lastfm_api_key: required("LASTFM_API_KEY")?,
            lastfm_api_secret: required("LASTFM_API_SECRET")?,
            lastfm_api_host: env::var("LASTFM_API_HOST")
                .unwrap_or_else(|_| "ws.audioscrobbler.com".to_string()),
            navidrome_url: required("NAVIDROME_URL")?,
            users_file: env::var("USERS_FILE")
                .unwrap_or_else(|_| "users.json".to_string())
                .into(),
            bridge_token,
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            sync_interval,
            loved_tracks_page_size: env::var("LOVED_TRACKS_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(MAX_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            cors_origins,
        })
    }
}
