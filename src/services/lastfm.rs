use crate::error::{AppError, Result};
use crate::models::lastfm::{
    ApiResponse, Empty, Envelope, LastfmRequest, LovedTracksPayload, ScrobblePayload,
    SessionPayload,
};
use crate::models::{LovedTrack, PaginatedResult, RemoteUser, SessionInfo, Track};
use crate::services::signer::RequestSigner;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_VERSION: &str = "2.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page `user.getLovedTracks` will serve.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// The remote calls the bridge makes. Failures are logged by the implementation
/// and reported as `false`/`None`.
#[async_trait]
pub trait LastfmApi: Send + Sync {
    async fn request_session(&self, username: &str, password: &str) -> Result<SessionInfo>;

    async fn scrobble(&self, track: &Track, user: &RemoteUser) -> bool;

    async fn now_playing(&self, track: &Track, user: &RemoteUser) -> bool;

    async fn love_track(&self, track: &Track, user: &RemoteUser, love: bool) -> bool;

    async fn loved_tracks_page(
        &self,
        user: &RemoteUser,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Option<PaginatedResult<LovedTrack>>;
}

#[derive(Debug, Clone)]
pub struct LastfmClient {
    client: Client,
    api_key: String,
    signer: RequestSigner,
    secure_base: String,
    plain_base: String,
}

impl LastfmClient {
    pub fn new(api_key: String, api_secret: String, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self::with_endpoints(
            api_key,
            api_secret,
            format!("https://{}/{}/", host, API_VERSION),
            format!("http://{}/{}/", host, API_VERSION),
        )
    }

    /// Point both secure and plain calls at a single base URL.
    pub fn with_base_url(api_key: String, api_secret: String, base_url: &str) -> Self {
        let base = format!("{}/{}/", base_url.trim_end_matches('/'), API_VERSION);
        Self::with_endpoints(api_key, api_secret, base.clone(), base)
    }

    fn with_endpoints(
        api_key: String,
        api_secret: String,
        secure_base: String,
        plain_base: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            signer: RequestSigner::new(api_secret),
            secure_base,
            plain_base,
        }
    }

    fn endpoint(&self, secure: bool) -> &str {
        if secure {
            &self.secure_base
        } else {
            &self.plain_base
        }
    }

    /// Full parameter set for a call: method params, `api_key`, `method`,
    /// `sk` when acting for a user, and `api_sig` when `sign` is set.
    fn build_params(
        &self,
        request: &LastfmRequest,
        session_key: Option<&str>,
        sign: bool,
    ) -> BTreeMap<String, String> {
        let mut params = request.params();
        params.insert("api_key".to_string(), self.api_key.clone());
        params.insert("method".to_string(), request.method().to_string());
        if let Some(sk) = session_key {
            params.insert("sk".to_string(), sk.to_string());
        }
        if sign {
            self.signer.append_signature(&mut params);
        }
        params
    }

    pub fn build_get_url(&self, request: &LastfmRequest, session_key: Option<&str>) -> String {
        let params = self.build_params(request, session_key, request.requires_session());
        let query = params
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}?format=json&{}",
            self.endpoint(request.is_secure()),
            query
        )
    }

    /// Signed, form-encoded POST. Returns `None` on transport or decode failure.
    pub async fn post<T: DeserializeOwned>(
        &self,
        request: &LastfmRequest,
        session_key: Option<&str>,
    ) -> Option<Envelope<T>> {
        let params = self.build_params(request, session_key, true);
        let url = format!("{}?format=json", self.endpoint(request.is_secure()));

        tracing::debug!("POST {} to Last.fm", request.method());

        let response = match self.client.post(&url).form(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Last.fm {} request failed: {}", request.method(), e);
                return None;
            }
        };

        Self::decode(request.method(), response).await
    }

    /// GET with an escaped query string. Cancelling drops the in-flight request.
    pub async fn get<T: DeserializeOwned>(
        &self,
        request: &LastfmRequest,
        session_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<Envelope<T>> {
        let url = self.build_get_url(request, session_key);

        tracing::debug!("GET {} from Last.fm", request.method());

        let send = self.client.get(&url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Last.fm {} cancelled", request.method());
                return None;
            }
            result = send => match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Last.fm {} request failed: {}", request.method(), e);
                    return None;
                }
            }
        };

        Self::decode(request.method(), response).await
    }

    async fn decode<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Option<Envelope<T>> {
        // Error bodies come back with 4xx statuses but are still envelopes.
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to read Last.fm {} response: {}", method, e);
                return None;
            }
        };

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => {
                if envelope.is_error() {
                    tracing::error!(
                        "Last.fm {} returned error {}: {}",
                        method,
                        envelope.error_code(),
                        envelope.message()
                    );
                }
                Some(envelope)
            }
            Err(e) => {
                tracing::debug!(
                    "Failed to parse Last.fm {} response ({}): {} - {}",
                    method,
                    status,
                    e,
                    body.chars().take(200).collect::<String>()
                );
                None
            }
        }
    }

    fn session_for<'a>(user: &'a RemoteUser, action: &str) -> Option<&'a str> {
        let key = user.session_key();
        if key.is_none() {
            tracing::info!(
                "No session key present for {}, skipping {}",
                user.lastfm_username,
                action
            );
        }
        key
    }
}

#[async_trait]
impl LastfmApi for LastfmClient {
    async fn request_session(&self, username: &str, password: &str) -> Result<SessionInfo> {
        let request = LastfmRequest::MobileSession {
            username: username.to_string(),
            password: password.to_string(),
        };

        let envelope = self
            .post::<SessionPayload>(&request, None)
            .await
            .ok_or_else(|| AppError::Lastfm("No response from Last.fm".to_string()))?;

        if envelope.is_error() {
            return Err(AppError::Lastfm(envelope.message().to_string()));
        }

        envelope
            .payload
            .session
            .map(SessionInfo::from)
            .ok_or_else(|| AppError::Lastfm("Last.fm response did not contain a session".to_string()))
    }

    async fn scrobble(&self, track: &Track, user: &RemoteUser) -> bool {
        let Some(sk) = Self::session_for(user, "scrobble") else {
            return false;
        };

        let request = LastfmRequest::Scrobble {
            track: track.clone(),
            timestamp: Utc::now().timestamp(),
        };

        match self.post::<ScrobblePayload>(&request, Some(sk)).await {
            Some(envelope) if !envelope.is_error() => {
                let ignored = envelope
                    .payload
                    .scrobbles
                    .and_then(|s| s.attributes)
                    .map(|a| a.ignored)
                    .unwrap_or(0);
                if ignored > 0 {
                    tracing::warn!(
                        "Last.fm ignored scrobble of '{}' for {}",
                        track.title,
                        user.lastfm_username
                    );
                }
                tracing::info!(
                    "{} played '{}' - {} - {}",
                    user.lastfm_username,
                    track.title,
                    track.album.as_deref().unwrap_or(""),
                    track.artist
                );
                true
            }
            _ => {
                tracing::error!("Failed to scrobble track: {}", track.title);
                false
            }
        }
    }

    async fn now_playing(&self, track: &Track, user: &RemoteUser) -> bool {
        let Some(sk) = Self::session_for(user, "now playing") else {
            return false;
        };

        let request = LastfmRequest::NowPlaying {
            track: track.clone(),
        };

        match self.post::<ScrobblePayload>(&request, Some(sk)).await {
            Some(envelope) if !envelope.is_error() => {
                tracing::info!(
                    "{} is now playing '{}' - {} - {}",
                    user.lastfm_username,
                    track.title,
                    track.album.as_deref().unwrap_or(""),
                    track.artist
                );
                true
            }
            _ => {
                tracing::error!("Failed to send now playing for track: {}", track.title);
                false
            }
        }
    }

    async fn love_track(&self, track: &Track, user: &RemoteUser, love: bool) -> bool {
        let Some(sk) = Self::session_for(user, "love") else {
            return false;
        };

        let request = LastfmRequest::Love {
            artist: track.artist.clone(),
            track: track.title.clone(),
            love,
        };

        match self.post::<Empty>(&request, Some(sk)).await {
            Some(envelope) if !envelope.is_error() => {
                tracing::info!(
                    "{} {}loved track '{}'",
                    user.lastfm_username,
                    if love { "" } else { "un" },
                    track.title
                );
                true
            }
            Some(envelope) => {
                tracing::error!(
                    "{} failed to {} track '{}': {}",
                    user.lastfm_username,
                    request.method(),
                    track.title,
                    envelope.message()
                );
                false
            }
            None => {
                tracing::error!(
                    "{} failed to {} track '{}'",
                    user.lastfm_username,
                    request.method(),
                    track.title
                );
                false
            }
        }
    }

    async fn loved_tracks_page(
        &self,
        user: &RemoteUser,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Option<PaginatedResult<LovedTrack>> {
        let request = LastfmRequest::GetLovedTracks {
            user: user.lastfm_username.clone(),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            page,
        };

        let envelope = self
            .get::<LovedTracksPayload>(&request, None, cancel)
            .await?;
        if envelope.is_error() || !envelope.payload.has_tracks() {
            return None;
        }

        envelope.payload.into_page()
    }
}
