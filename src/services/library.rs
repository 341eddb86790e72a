use crate::error::Result;
use crate::models::{LocalArtist, RemoteUser, SaveReason, Track};
use async_trait::async_trait;

/// The local media library, seen from one user's point of view.
#[async_trait]
pub trait LibraryService: Send + Sync {
    async fn artists(&self, user: &RemoteUser) -> Result<Vec<LocalArtist>>;

    async fn artist_tracks(&self, user: &RemoteUser, artist: &LocalArtist) -> Result<Vec<Track>>;

    /// Writes the favorite flag. `reason` travels with the resulting
    /// user-data event so listeners can tell where the change came from.
    async fn set_favorite(
        &self,
        user: &RemoteUser,
        track: &Track,
        favorite: bool,
        reason: SaveReason,
    ) -> Result<()>;
}
