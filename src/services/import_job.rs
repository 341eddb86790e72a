//! Bulk import of Last.fm loved tracks into local favorites.

use crate::error::{AppError, Result};
use crate::models::RemoteUser;
use crate::services::job::{Cancelled, ProgressSink, ProgressWindow, SyncScope};
use crate::services::library::LibraryService;
use crate::services::loved_tracks::LovedTracksPaginator;
use crate::services::reconciler::LibraryReconciler;
use crate::services::users::UserStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed { matched: usize },
    Cancelled,
    AlreadyRunning,
}

/// Walks every linked user one after the other. Favorite writes made while
/// the job runs happen inside the sync scope.
pub struct ImportLovedTracksJob {
    users: Arc<UserStore>,
    library: Arc<dyn LibraryService>,
    paginator: LovedTracksPaginator,
    reconciler: LibraryReconciler,
    scope: SyncScope,
}

impl ImportLovedTracksJob {
    pub fn new(
        users: Arc<UserStore>,
        library: Arc<dyn LibraryService>,
        paginator: LovedTracksPaginator,
        scope: SyncScope,
    ) -> Self {
        Self {
            users,
            reconciler: LibraryReconciler::new(library.clone()),
            library,
            paginator,
            scope,
        }
    }

    pub async fn run(&self, progress: &dyn ProgressSink, cancel: &CancellationToken) -> SyncOutcome {
        let Some(_scope) = self.scope.enter() else {
            tracing::warn!("Loved tracks import already running");
            return SyncOutcome::AlreadyRunning;
        };

        let users = self.users.with_session();
        tracing::info!("Importing loved tracks for {} users", users.len());
        progress.report(0.0);

        let mut matched = 0;
        for (index, user) in users.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Loved tracks import cancelled");
                return SyncOutcome::Cancelled;
            }

            let window = ProgressWindow::slice(index, users.len());
            if !user.options.sync_favorites {
                tracing::debug!("{} does not sync favorites, skipping", user.lastfm_username);
                progress.report(window.percent(1.0));
                continue;
            }

            match self.import_user(user, progress, window, cancel).await {
                Ok(count) => matched += count,
                Err(Cancelled) => {
                    tracing::info!("Loved tracks import cancelled");
                    return SyncOutcome::Cancelled;
                }
            }
            progress.report(window.percent(1.0));
        }

        progress.report(100.0);
        tracing::info!("Loved tracks import finished, {} tracks matched", matched);
        SyncOutcome::Completed { matched }
    }

    async fn import_user(
        &self,
        user: &RemoteUser,
        progress: &dyn ProgressSink,
        window: ProgressWindow,
        cancel: &CancellationToken,
    ) -> std::result::Result<usize, Cancelled> {
        let artists = match self.library.artists(user).await {
            Ok(artists) => artists,
            Err(e) => {
                tracing::warn!(
                    "Failed to list artists for {}: {}",
                    user.library_username,
                    e
                );
                return Ok(0);
            }
        };

        let loved = self.paginator.fetch_all(user, progress, window, cancel).await?;
        let matched = self.reconciler.reconcile(user, &artists, loved, cancel).await?;

        tracing::info!(
            "{} of {}'s loved tracks matched the library",
            matched,
            user.lastfm_username
        );
        Ok(matched)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub finished_at: DateTime<Utc>,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub progress: f64,
    pub last_run: Option<LastRun>,
}

struct Running {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ControllerState {
    running: Option<Running>,
    last_run: Option<LastRun>,
}

struct Shared {
    job: ImportLovedTracksJob,
    state: Mutex<ControllerState>,
    progress: AtomicU64,
    shutdown: CancellationToken,
}

impl ProgressSink for Shared {
    fn report(&self, percent: f64) {
        self.progress.store(percent.to_bits(), Ordering::Relaxed);
    }
}

/// Runs the import job in the background, one run at a time.
#[derive(Clone)]
pub struct SyncController {
    shared: Arc<Shared>,
}

impl SyncController {
    pub fn new(job: ImportLovedTracksJob) -> Self {
        Self {
            shared: Arc::new(Shared {
                job,
                state: Mutex::new(ControllerState::default()),
                progress: AtomicU64::new(0f64.to_bits()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn start(&self) -> Result<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(AppError::Internal(anyhow::anyhow!("Shutting down")));
        }

        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running.is_some() {
            return Err(AppError::SyncInProgress);
        }

        let cancel = self.shared.shutdown.child_token();
        self.shared.report(0.0);

        let shared = self.shared.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = shared.job.run(shared.as_ref(), &token).await;
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.running = None;
            state.last_run = Some(LastRun {
                finished_at: Utc::now(),
                outcome,
            });
        });

        state.running = Some(Running {
            cancel,
            handle: Some(handle),
        });
        tracing::info!("Loved tracks import started");
        Ok(())
    }

    /// Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.running {
            Some(running) => {
                running.cancel.cancel();
                tracing::info!("Loved tracks import cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        SyncStatus {
            running: state.running.is_some(),
            progress: f64::from_bits(self.shared.progress.load(Ordering::Relaxed)),
            last_run: state.last_run.clone(),
        }
    }

    /// Starts the job every `every`, skipping ticks while a run is active.
    pub fn spawn_schedule(&self, every: Duration) -> JoinHandle<()> {
        let controller = self.clone();
        let shutdown = self.shared.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match controller.start() {
                            Ok(()) => {}
                            Err(AppError::SyncInProgress) => {
                                tracing::debug!("Scheduled import skipped, a run is in progress");
                            }
                            Err(e) => tracing::warn!("Scheduled import not started: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Cancels any run and waits for it to finish.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let handle = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.running.as_mut().and_then(|r| r.handle.take())
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Import task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaginatedResult, UserOptions};
    use crate::services::loved_tracks::tests::{loved, RecordingProgress, ScriptedPages};
    use crate::services::reconciler::tests::{artist, track, FakeLibrary};
    use std::collections::HashMap;

    fn linked(id: &str, sync_favorites: bool) -> RemoteUser {
        RemoteUser {
            local_user_id: id.into(),
            library_username: id.into(),
            library_password: String::new(),
            lastfm_username: format!("{}_fm", id),
            session_key: Some("sk".into()),
            options: UserOptions {
                scrobble: true,
                sync_favorites,
            },
        }
    }

    fn library() -> Arc<FakeLibrary> {
        Arc::new(FakeLibrary {
            artists: vec![artist("a1", Some("m1")), artist("a2", None)],
            tracks: HashMap::from([
                ("a1".to_string(), vec![track("t1", "Song One"), track("t2", "Other")]),
                ("a2".to_string(), vec![track("t3", "Song One")]),
            ]),
            ..Default::default()
        })
    }

    fn pages() -> Arc<ScriptedPages> {
        Arc::new(ScriptedPages {
            pages: vec![Some(PaginatedResult {
                items: vec![loved("m1", "song one")],
                page: 1,
                total_pages: 1,
                total: 1,
            })],
            ..Default::default()
        })
    }

    fn job(users: Vec<RemoteUser>, library: Arc<FakeLibrary>, scope: SyncScope) -> ImportLovedTracksJob {
        ImportLovedTracksJob::new(
            Arc::new(UserStore::new(users)),
            library,
            LovedTracksPaginator::new(pages(), 1000),
            scope,
        )
    }

    #[tokio::test]
    async fn test_run_matches_and_holds_scope() {
        let library = library();
        let scope = SyncScope::new();
        let job = job(vec![linked("u1", true)], library.clone(), scope.clone());
        let progress = RecordingProgress::default();

        let outcome = job.run(&progress, &CancellationToken::new()).await;

        assert_eq!(outcome, SyncOutcome::Completed { matched: 1 });
        assert!(!scope.is_active());
        let favorites = library.favorites.lock().unwrap().clone();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].0, "t1");
        assert_eq!(progress.0.lock().unwrap().last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn test_users_without_sync_are_skipped() {
        let library = library();
        let job = job(vec![linked("u1", false)], library.clone(), SyncScope::new());

        let outcome = job.run(&RecordingProgress::default(), &CancellationToken::new()).await;

        assert_eq!(outcome, SyncOutcome::Completed { matched: 0 });
        assert!(library.favorites.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_user() {
        let library = library();
        let job = job(vec![linked("u1", true)], library.clone(), SyncScope::new());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = job.run(&RecordingProgress::default(), &token).await;

        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert!(library.favorites.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_while_scope_held() {
        let scope = SyncScope::new();
        let job = job(vec![linked("u1", true)], library(), scope.clone());

        let _held = scope.enter().unwrap();
        let outcome = job.run(&RecordingProgress::default(), &CancellationToken::new()).await;

        assert_eq!(outcome, SyncOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn test_controller_records_last_run() {
        let controller = SyncController::new(job(vec![linked("u1", true)], library(), SyncScope::new()));

        controller.start().unwrap();
        for _ in 0..100 {
            if !controller.status().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = controller.status();
        assert!(!status.running);
        assert_eq!(status.progress, 100.0);
        let last_run = status.last_run.unwrap();
        assert_eq!(last_run.outcome, SyncOutcome::Completed { matched: 1 });
        assert!(!controller.cancel());

        controller.shutdown().await;
        assert!(controller.start().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SyncOutcome::Completed { matched: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "completed", "matched": 3}));
    }
}
