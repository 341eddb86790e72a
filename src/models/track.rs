use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of a local audio item, taken when an event fires or the library is scanned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_artist: Option<String>,
    /// MusicBrainz recording id.
    #[serde(default)]
    pub musicbrainz_id: Option<String>,
    #[serde(default, with = "duration_secs")]
    pub duration: Option<Duration>,
}

impl Track {
    /// Album artist, only when it differs from the primary artist.
    pub fn distinct_album_artist(&self) -> Option<&str> {
        self.album_artist
            .as_deref()
            .filter(|a| !a.trim().is_empty() && !a.eq_ignore_ascii_case(&self.artist))
    }

    pub fn has_artist_and_title(&self) -> bool {
        !self.artist.trim().is_empty() && !self.title.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalArtist {
    pub id: String,
    pub name: String,
    pub musicbrainz_id: Option<String>,
}

/// A track the user has loved on Last.fm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LovedTrack {
    pub artist_name: String,
    pub artist_mbid: Option<String>,
    pub title: String,
}

impl LovedTrack {
    pub fn artist_mbid(&self) -> Option<&str> {
        self.artist_mbid.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    /// Item count across all pages, as reported by the service.
    pub total: u32,
}

impl<T> PaginatedResult<T> {
    pub fn is_last_page(&self) -> bool {
        self.page == self.total_pages
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        // Negative, non-finite or out of range values read as unknown.
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s).ok()))
    }
}
