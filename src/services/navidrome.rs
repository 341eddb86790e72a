use crate::error::{AppError, Result};
use crate::models::{LocalArtist, MediaEvent, RemoteUser, SaveReason, Track, UserDataSaved};
use crate::services::events::EventPublisher;
use crate::services::job::SyncScope;
use crate::services::library::LibraryService;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const API_VERSION: &str = "1.16.1";
const CLIENT_NAME: &str = "lastfm-bridge";

/// Subsonic API client acting on behalf of each linked library user.
#[derive(Clone)]
pub struct NavidromeClient {
    base_url: String,
    client: Client,
    events: Option<EventPublisher>,
    sync_scope: SyncScope,
}

#[derive(Debug, Deserialize)]
struct SubsonicResponse<T> {
    #[serde(rename = "subsonic-response")]
    subsonic_response: SubsonicBody<T>,
}

#[derive(Debug, Deserialize)]
struct SubsonicBody<T> {
    status: String,
    error: Option<SubsonicError>,
    #[serde(flatten)]
    payload: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SubsonicError {
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct ArtistsPayload {
    artists: ArtistIndexes,
}

#[derive(Debug, Deserialize)]
struct ArtistIndexes {
    #[serde(default)]
    index: Vec<ArtistIndex>,
}

#[derive(Debug, Deserialize)]
struct ArtistIndex {
    #[serde(default)]
    artist: Vec<NavidromeArtist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavidromeArtist {
    id: String,
    name: String,
    #[serde(default)]
    music_brainz_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistPayload {
    artist: ArtistWithAlbums,
}

#[derive(Debug, Deserialize)]
struct ArtistWithAlbums {
    #[serde(default)]
    album: Vec<AlbumRef>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AlbumPayload {
    album: AlbumWithSongs,
}

#[derive(Debug, Deserialize)]
struct AlbumWithSongs {
    #[serde(default)]
    song: Vec<NavidromeSong>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavidromeSong {
    id: String,
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    display_album_artist: Option<String>,
    #[serde(default)]
    music_brainz_id: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
}

impl From<NavidromeArtist> for LocalArtist {
    fn from(artist: NavidromeArtist) -> Self {
        LocalArtist {
            id: artist.id,
            name: artist.name,
            musicbrainz_id: artist.music_brainz_id.filter(|id| !id.is_empty()),
        }
    }
}

impl From<NavidromeSong> for Track {
    fn from(song: NavidromeSong) -> Self {
        Track {
            id: song.id,
            title: song.title,
            artist: song.artist,
            album: song.album.filter(|a| !a.is_empty()),
            album_artist: song.display_album_artist.filter(|a| !a.is_empty()),
            musicbrainz_id: song.music_brainz_id.filter(|id| !id.is_empty()),
            duration: song.duration.filter(|d| *d > 0).map(Duration::from_secs),
        }
    }
}

impl NavidromeClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            events: None,
            sync_scope: SyncScope::new(),
        }
    }

    /// Favorite writes are announced on `events` once the server accepted them.
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    /// Writes made while `scope` is held are tagged as import writes.
    pub fn with_sync_scope(mut self, scope: SyncScope) -> Self {
        self.sync_scope = scope;
        self
    }

    fn generate_salt() -> String {
        let mut rng = rand::thread_rng();
        (0..8)
            .map(|_| format!("{:02x}", rng.gen::<u8>()))
            .collect()
    }

    fn auth_params(user: &RemoteUser) -> Vec<(String, String)> {
        let salt = Self::generate_salt();
        let token = format!(
            "{:x}",
            md5::compute(format!("{}{}", user.library_password, salt))
        );

        vec![
            ("u".to_string(), user.library_username.clone()),
            ("t".to_string(), token),
            ("s".to_string(), salt),
            ("v".to_string(), API_VERSION.to_string()),
            ("c".to_string(), CLIENT_NAME.to_string()),
            ("f".to_string(), "json".to_string()),
        ]
    }

    async fn get<T: DeserializeOwned>(
        &self,
        user: &RemoteUser,
        endpoint: &str,
        extra: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/rest/{}", self.base_url, endpoint);
        let mut params = Self::auth_params(user);
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        tracing::debug!("Navidrome {} for {}", endpoint, user.library_username);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::Library(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Navidrome API error on {}: {}", endpoint, status);
            return Err(AppError::Library(format!("API returned status: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Library(format!("Failed to read response: {}", e)))?;

        let parsed: SubsonicResponse<T> = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            AppError::Library(format!("Failed to parse response: {} - Response: {}", e, preview))
        })?;

        let body = parsed.subsonic_response;
        if body.status != "ok" {
            let (code, message) = body
                .error
                .map(|e| (e.code, e.message))
                .unwrap_or((0, "unknown error".to_string()));
            return Err(AppError::Library(format!("{} (code {})", message, code)));
        }

        body.payload
            .ok_or_else(|| AppError::Library(format!("Empty {} response", endpoint)))
    }
}

#[async_trait]
impl LibraryService for NavidromeClient {
    async fn artists(&self, user: &RemoteUser) -> Result<Vec<LocalArtist>> {
        let payload: ArtistsPayload = self.get(user, "getArtists", &[]).await?;

        let artists: Vec<LocalArtist> = payload
            .artists
            .index
            .into_iter()
            .flat_map(|index| index.artist)
            .map(LocalArtist::from)
            .collect();

        tracing::debug!(
            "{} artists in library for {}",
            artists.len(),
            user.library_username
        );
        Ok(artists)
    }

    async fn artist_tracks(&self, user: &RemoteUser, artist: &LocalArtist) -> Result<Vec<Track>> {
        let payload: ArtistPayload = self.get(user, "getArtist", &[("id", &artist.id)]).await?;

        let mut tracks = Vec::new();
        for album in payload.artist.album {
            match self.get::<AlbumPayload>(user, "getAlbum", &[("id", &album.id)]).await {
                Ok(found) => tracks.extend(found.album.song.into_iter().map(Track::from)),
                Err(e) => tracing::warn!(
                    "Skipping album {} of {}: {}",
                    album.id,
                    artist.name,
                    e
                ),
            }
        }
        Ok(tracks)
    }

    async fn set_favorite(
        &self,
        user: &RemoteUser,
        track: &Track,
        favorite: bool,
        reason: SaveReason,
    ) -> Result<()> {
        let endpoint = if favorite { "star" } else { "unstar" };
        let during_sync = self.sync_scope.is_active();
        let _: Empty = self.get(user, endpoint, &[("id", &track.id)]).await?;

        if let Some(events) = &self.events {
            events.publish(MediaEvent::UserDataSaved(UserDataSaved {
                user_id: user.local_user_id.clone(),
                track: track.clone(),
                is_favorite: favorite,
                reason,
                during_sync,
            }));
        }
        Ok(())
    }
}
