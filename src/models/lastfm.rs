//! Last.fm wire types.
//!
//! Requests are a closed set of variants that all render to a flat parameter
//! map; responses share one envelope carrying `message`/`error` next to the
//! method-specific payload.

use super::{LovedTrack, PaginatedResult, SessionInfo, Track};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum LastfmRequest {
    MobileSession {
        username: String,
        password: String,
    },
    Scrobble {
        track: Track,
        timestamp: i64,
    },
    NowPlaying {
        track: Track,
    },
    Love {
        artist: String,
        track: String,
        love: bool,
    },
    GetLovedTracks {
        user: String,
        limit: u32,
        page: u32,
    },
}

impl LastfmRequest {
    pub fn method(&self) -> &'static str {
        match self {
            LastfmRequest::MobileSession { .. } => "auth.getMobileSession",
            LastfmRequest::Scrobble { .. } => "track.scrobble",
            LastfmRequest::NowPlaying { .. } => "track.updateNowPlaying",
            LastfmRequest::Love { love: true, .. } => "track.love",
            LastfmRequest::Love { love: false, .. } => "track.unlove",
            LastfmRequest::GetLovedTracks { .. } => "user.getLovedTracks",
        }
    }

    /// Write and auth calls must travel over TLS.
    pub fn is_secure(&self) -> bool {
        !matches!(self, LastfmRequest::GetLovedTracks { .. })
    }

    /// Calls that act on behalf of a user and carry `sk` plus a signature.
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            LastfmRequest::Scrobble { .. }
                | LastfmRequest::NowPlaying { .. }
                | LastfmRequest::Love { .. }
        )
    }

    /// Method-specific parameters, without `api_key`, `method`, `sk` or `api_sig`.
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut put = |k: &str, v: &str| {
            params.insert(k.to_string(), v.to_string());
        };

        match self {
            LastfmRequest::MobileSession { username, password } => {
                put("username", username);
                put("password", password);
            }
            LastfmRequest::Scrobble { track, timestamp } => {
                put_track(&mut put, track);
                put("timestamp", &timestamp.to_string());
            }
            LastfmRequest::NowPlaying { track } => put_track(&mut put, track),
            LastfmRequest::Love { artist, track, .. } => {
                put("artist", artist);
                put("track", track);
            }
            LastfmRequest::GetLovedTracks { user, limit, page } => {
                put("user", user);
                put("limit", &limit.to_string());
                put("page", &page.to_string());
            }
        }

        params
    }
}

fn put_track(put: &mut impl FnMut(&str, &str), track: &Track) {
    put("track", &track.title);
    put("artist", &track.artist);
    if let Some(album) = track.album.as_deref().filter(|a| !a.trim().is_empty()) {
        put("album", album);
    }
    if let Some(album_artist) = track.distinct_album_artist() {
        put("albumArtist", album_artist);
    }
    if let Some(mbid) = track.musicbrainz_id.as_deref().filter(|m| !m.trim().is_empty()) {
        put("mbid", mbid);
    }
    if let Some(duration) = track.duration {
        put("duration", &duration.as_secs().to_string());
    }
}

/// Shared contract of every Last.fm response.
pub trait ApiResponse {
    fn error_code(&self) -> i32;
    fn message(&self) -> &str;

    fn is_error(&self) -> bool {
        self.error_code() > 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub error: i32,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> ApiResponse for Envelope<T> {
    fn error_code(&self) -> i32 {
        self.error
    }

    fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Payload of calls that return nothing of interest (love/unlove).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionPayload {
    pub session: Option<MobileSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobileSession {
    pub name: String,
    pub key: String,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub subscriber: i32,
}

impl From<MobileSession> for SessionInfo {
    fn from(session: MobileSession) -> Self {
        SessionInfo {
            name: session.name,
            key: session.key,
            subscriber: session.subscriber > 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrobblePayload {
    pub scrobbles: Option<Scrobbles>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scrobbles {
    #[serde(rename = "@attr")]
    pub attributes: Option<ScrobbleAttributes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrobbleAttributes {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub accepted: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub ignored: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LovedTracksPayload {
    #[serde(rename = "lovedtracks")]
    pub loved_tracks: Option<LovedTracks>,
}

impl LovedTracksPayload {
    pub fn has_tracks(&self) -> bool {
        self.loved_tracks
            .as_ref()
            .map(|l| !l.tracks.is_empty())
            .unwrap_or(false)
    }

    pub fn into_page(self) -> Option<PaginatedResult<LovedTrack>> {
        let loved = self.loved_tracks?;
        Some(PaginatedResult {
            items: loved.tracks.into_iter().map(Into::into).collect(),
            page: loved.metadata.page,
            total_pages: loved.metadata.total_pages,
            total: loved.metadata.total,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LovedTracks {
    #[serde(rename = "track", default, deserialize_with = "one_or_many")]
    pub tracks: Vec<WireTrack>,
    #[serde(rename = "@attr")]
    pub metadata: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    #[serde(deserialize_with = "lenient_u32")]
    pub page: u32,
    #[serde(rename = "totalPages", deserialize_with = "lenient_u32")]
    pub total_pages: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTrack {
    pub name: String,
    pub artist: WireArtist,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireArtist {
    pub name: String,
    #[serde(default)]
    pub mbid: Option<String>,
}

impl From<WireTrack> for LovedTrack {
    fn from(track: WireTrack) -> Self {
        LovedTrack {
            artist_name: track.artist.name,
            artist_mbid: track.artist.mbid.filter(|id| !id.is_empty()),
            title: track.name,
        }
    }
}

// Last.fm renders most numbers as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.trim().is_empty() => Ok(0),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let n = lenient_i64(d)?;
    i32::try_from(n).map_err(serde::de::Error::custom)
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = lenient_i64(d)?;
    u32::try_from(n).map_err(serde::de::Error::custom)
}

// A single-element list arrives as a bare object.
fn one_or_many<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(d)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn track() -> Track {
        Track {
            id: "t1".into(),
            title: "Paranoid Android".into(),
            artist: "Radiohead".into(),
            album: Some("OK Computer".into()),
            album_artist: Some("Radiohead".into()),
            musicbrainz_id: None,
            duration: Some(Duration::from_secs(387)),
        }
    }

    #[test]
    fn test_scrobble_params_skip_redundant_album_artist() {
        let params = LastfmRequest::Scrobble { track: track(), timestamp: 1_700_000_000 }.params();

        assert_eq!(params.get("track").map(String::as_str), Some("Paranoid Android"));
        assert_eq!(params.get("album").map(String::as_str), Some("OK Computer"));
        assert_eq!(params.get("duration").map(String::as_str), Some("387"));
        assert_eq!(params.get("timestamp").map(String::as_str), Some("1700000000"));
        assert!(!params.contains_key("albumArtist"));
        assert!(!params.contains_key("mbid"));
    }

    #[test]
    fn test_love_method_follows_flag() {
        let love = LastfmRequest::Love { artist: "a".into(), track: "t".into(), love: true };
        let unlove = LastfmRequest::Love { artist: "a".into(), track: "t".into(), love: false };
        assert_eq!(love.method(), "track.love");
        assert_eq!(unlove.method(), "track.unlove");
        assert!(love.requires_session() && love.is_secure());

        let loved = LastfmRequest::GetLovedTracks { user: "rj".into(), limit: 50, page: 1 };
        assert!(!loved.requires_session());
        assert!(!loved.is_secure());
    }

    #[test]
    fn test_loved_tracks_envelope_with_string_numbers() {
        let body = r#"{
            "lovedtracks": {
                "track": [
                    {"name": "Karma Police", "mbid": "", "artist": {"name": "Radiohead", "mbid": "a74b1b7f-71a5-4011-9441-d0b5e4122711"}},
                    {"name": "Untitled", "artist": {"name": "Nobody", "mbid": ""}}
                ],
                "@attr": {"user": "rj", "page": "2", "totalPages": "3", "perPage": "2", "total": "6"}
            }
        }"#;

        let envelope: Envelope<LovedTracksPayload> = serde_json::from_str(body).unwrap();
        assert!(!envelope.is_error());
        assert!(envelope.payload.has_tracks());

        let page = envelope.payload.into_page().unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 3);
        assert!(!page.is_last_page());
        assert_eq!(page.items[0].artist_mbid(), Some("a74b1b7f-71a5-4011-9441-d0b5e4122711"));
        assert_eq!(page.items[1].artist_mbid(), None);
    }

    #[test]
    fn test_single_loved_track_as_object() {
        let body = r#"{"lovedtracks": {
            "track": {"name": "Creep", "artist": {"name": "Radiohead", "mbid": "x"}},
            "@attr": {"page": "1", "totalPages": "1", "total": "1"}
        }}"#;

        let envelope: Envelope<LovedTracksPayload> = serde_json::from_str(body).unwrap();
        let page = envelope.payload.into_page().unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.is_last_page());
    }

    #[test]
    fn test_error_envelope() {
        let body = r#"{"error": 9, "message": "Invalid session key - Please re-authenticate"}"#;
        let envelope: Envelope<Empty> = serde_json::from_str(body).unwrap();
        assert!(envelope.is_error());
        assert_eq!(envelope.message(), "Invalid session key - Please re-authenticate");

        let envelope: Envelope<SessionPayload> = serde_json::from_str(body).unwrap();
        assert!(envelope.payload.session.is_none());
    }

    #[test]
    fn test_session_and_scrobble_payloads() {
        let body = r#"{"session": {"name": "rj", "key": "d580d57f32848f5dcf574d1ce18d78b2", "subscriber": 0}}"#;
        let envelope: Envelope<SessionPayload> = serde_json::from_str(body).unwrap();
        let info: SessionInfo = envelope.payload.session.unwrap().into();
        assert_eq!(info.key, "d580d57f32848f5dcf574d1ce18d78b2");
        assert!(!info.subscriber);

        let body = r#"{"scrobbles": {"@attr": {"accepted": 1, "ignored": "0"}, "scrobble": {}}}"#;
        let envelope: Envelope<ScrobblePayload> = serde_json::from_str(body).unwrap();
        let attrs = envelope.payload.scrobbles.unwrap().attributes.unwrap();
        assert_eq!((attrs.accepted, attrs.ignored), (1, 0));
    }
}
