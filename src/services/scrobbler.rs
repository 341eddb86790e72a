use crate::models::{PlaybackEvent, SaveReason, UserDataSaved};
use crate::services::dedup::DuplicateScrobbleGuard;
use crate::services::eligibility::{evaluate_now_playing, evaluate_scrobble};
use crate::services::events::MediaEventListener;
use crate::services::job::SyncScope;
use crate::services::lastfm::LastfmApi;
use crate::services::users::UserStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Forwards live playback and favorite events to Last.fm.
pub struct Scrobbler {
    api: Arc<dyn LastfmApi>,
    users: Arc<UserStore>,
    guard: DuplicateScrobbleGuard,
    sync_scope: SyncScope,
}

impl Scrobbler {
    pub fn new(api: Arc<dyn LastfmApi>, users: Arc<UserStore>, sync_scope: SyncScope) -> Self {
        Self::with_guard(api, users, sync_scope, DuplicateScrobbleGuard::new())
    }

    pub fn with_guard(
        api: Arc<dyn LastfmApi>,
        users: Arc<UserStore>,
        sync_scope: SyncScope,
        guard: DuplicateScrobbleGuard,
    ) -> Self {
        Self {
            api,
            users,
            guard,
            sync_scope,
        }
    }
}

#[async_trait]
impl MediaEventListener for Scrobbler {
    fn name(&self) -> &'static str {
        "scrobbler"
    }

    async fn playback_started(&self, event: &PlaybackEvent) {
        let user = event.primary_user().and_then(|id| self.users.get(id));
        let Ok(user) = evaluate_now_playing(&event.track, user) else {
            return;
        };
        self.api.now_playing(&event.track, user).await;
    }

    async fn playback_stopped(&self, event: &PlaybackEvent) {
        let user = event.primary_user().and_then(|id| self.users.get(id));
        let Ok(user) = evaluate_scrobble(event, user) else {
            return;
        };

        if self.guard.check_and_reserve(&user.local_user_id, &event.track.id) {
            tracing::debug!(
                "Skipping duplicate scrobble of '{}' for {}",
                event.track.title,
                user.lastfm_username
            );
            return;
        }

        self.api.scrobble(&event.track, user).await;
    }

    async fn user_data_saved(&self, event: &UserDataSaved) {
        if event.reason != SaveReason::UpdateUserRating {
            return;
        }

        let Some(user) = self.users.get(&event.user_id) else {
            tracing::debug!("Could not find Last.fm user for {}", event.user_id);
            return;
        };

        if !user.has_session() {
            tracing::debug!(
                "No session key present for {}, not updating love status",
                user.lastfm_username
            );
            return;
        }

        if event.during_sync || self.sync_scope.is_active() {
            tracing::debug!(
                "Import in progress, not echoing favorite change of '{}'",
                event.track.title
            );
            return;
        }

        self.api
            .love_track(&event.track, user, event.is_favorite)
            .await;
    }
}
