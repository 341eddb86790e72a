use crate::models::{LovedTrack, RemoteUser};
use crate::services::job::{Cancelled, ProgressSink, ProgressWindow};
use crate::services::lastfm::{LastfmApi, MAX_PAGE_SIZE};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Walks `user.getLovedTracks` page by page until the last page.
pub struct LovedTracksPaginator {
    api: Arc<dyn LastfmApi>,
    page_size: u32,
}

impl LovedTracksPaginator {
    pub fn new(api: Arc<dyn LastfmApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Collects every loved track of `user`. A failed or empty page ends the
    /// walk early and whatever was gathered so far is returned.
    pub async fn fetch_all(
        &self,
        user: &RemoteUser,
        progress: &dyn ProgressSink,
        window: ProgressWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<LovedTrack>, Cancelled> {
        let mut tracks = Vec::new();
        let mut page = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let result = self
                .api
                .loved_tracks_page(user, page, self.page_size, cancel)
                .await;

            let Some(result) = result.filter(|r| !r.items.is_empty()) else {
                if cancel.is_cancelled() {
                    return Err(Cancelled);
                }
                tracing::debug!(
                    "No loved tracks on page {} for {}, stopping",
                    page,
                    user.lastfm_username
                );
                break;
            };

            let last_page = result.is_last_page();
            if result.total_pages > 0 {
                let percent = window.percent(result.page as f64 / result.total_pages as f64);
                tracing::debug!("Loved tracks progress: {:.1}%", percent);
                progress.report(percent);
            }

            tracing::debug!(
                "Fetched page {}/{} ({} of {} loved tracks) for {}",
                result.page,
                result.total_pages,
                result.items.len(),
                result.total,
                user.lastfm_username
            );
            tracks.extend(result.items);

            // A page past the reported total also ends the walk.
            if last_page || result.page > result.total_pages {
                break;
            }
            page += 1;
        }

        tracing::info!(
            "Retrieved {} loved tracks from Last.fm for user {}",
            tracks.len(),
            user.lastfm_username
        );
        Ok(tracks)
    }
}
