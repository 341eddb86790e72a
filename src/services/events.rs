//! Fan-out of media-server events to registered listeners.
//!
//! Listeners are registered before [`EventHub::start`]. Every event is handled
//! on its own task so a slow Last.fm call never holds up the next event.
//! [`EventHub::shutdown`] stops intake first, then waits for handlers already
//! running; nothing is dispatched once shutdown has begun.

use crate::models::{MediaEvent, PlaybackEvent, UserDataSaved};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait MediaEventListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn playback_started(&self, _event: &PlaybackEvent) {}

    async fn playback_stopped(&self, _event: &PlaybackEvent) {}

    async fn user_data_saved(&self, _event: &UserDataSaved) {}
}

/// Cheap handle for pushing events into the hub.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<MediaEvent>,
    shutdown: CancellationToken,
}

impl EventPublisher {
    /// Queues an event without waiting. Returns `false` once the hub is shutting down.
    pub fn publish(&self, event: MediaEvent) -> bool {
        if self.shutdown.is_cancelled() {
            tracing::debug!("Event hub closed, dropping {}", event.kind());
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

pub struct EventHub {
    publisher: EventPublisher,
    rx: Mutex<Option<mpsc::UnboundedReceiver<MediaEvent>>>,
    listeners: Mutex<Vec<Arc<dyn MediaEventListener>>>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            publisher: EventPublisher {
                tx,
                shutdown: CancellationToken::new(),
            },
            rx: Mutex::new(Some(rx)),
            listeners: Mutex::new(Vec::new()),
            dispatcher: tokio::sync::Mutex::new(None),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    pub fn publish(&self, event: MediaEvent) -> bool {
        self.publisher.publish(event)
    }

    /// Adds a listener. Has no effect once the hub is started.
    pub fn register(&self, listener: Arc<dyn MediaEventListener>) {
        let started = self.rx.lock().unwrap_or_else(|e| e.into_inner()).is_none();
        if started {
            tracing::warn!("Event hub already started, ignoring listener {}", listener.name());
            return;
        }
        tracing::info!("Registered event listener: {}", listener.name());
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Spawns the dispatcher. Calling it twice is a no-op.
    pub async fn start(&self) {
        let Some(rx) = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return;
        };
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let shutdown = self.publisher.shutdown.clone();

        let handle = tokio::spawn(dispatch_loop(rx, listeners, shutdown));
        *self.dispatcher.lock().await = Some(handle);
    }

    pub async fn shutdown(&self) {
        self.publisher.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Event dispatcher ended abnormally: {}", e);
            }
        }
        tracing::info!("Event hub stopped");
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<MediaEvent>,
    listeners: Vec<Arc<dyn MediaEventListener>>,
    shutdown: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    tracing::error!("Event handler panicked: {}", e);
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if shutdown.is_cancelled() {
                    break;
                }
                for listener in &listeners {
                    let listener = listener.clone();
                    let event = event.clone();
                    in_flight.spawn(async move { deliver(listener.as_ref(), &event).await });
                }
            }
        }
    }

    rx.close();
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::info!("Dropped {} queued events during shutdown", dropped);
    }

    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            tracing::error!("Event handler panicked: {}", e);
        }
    }
}

async fn deliver(listener: &dyn MediaEventListener, event: &MediaEvent) {
    tracing::debug!("Delivering {} to {}", event.kind(), listener.name());
    match event {
        MediaEvent::PlaybackStarted(e) => listener.playback_started(e).await,
        MediaEvent::PlaybackStopped(e) => listener.playback_stopped(e).await,
        MediaEvent::UserDataSaved(e) => listener.user_data_saved(e).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SaveReason, Track};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        stopped: AtomicUsize,
        saved: AtomicUsize,
    }

    #[async_trait]
    impl MediaEventListener for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn playback_started(&self, _: &PlaybackEvent) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        async fn playback_stopped(&self, _: &PlaybackEvent) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
        async fn user_data_saved(&self, _: &UserDataSaved) {
            self.saved.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn track() -> Track {
        Track {
            id: "t1".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: None,
            album_artist: None,
            musicbrainz_id: None,
            duration: None,
        }
    }

    fn playback() -> PlaybackEvent {
        PlaybackEvent {
            track: track(),
            position: None,
            played_to_completion: false,
            user_ids: vec!["u1".into()],
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_events_reach_every_listener() {
        let hub = EventHub::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        hub.register(a.clone());
        hub.register(b.clone());
        hub.start().await;

        assert!(hub.publish(MediaEvent::PlaybackStarted(playback())));
        assert!(hub.publish(MediaEvent::PlaybackStopped(playback())));
        assert!(hub.publisher().publish(MediaEvent::UserDataSaved(UserDataSaved {
            user_id: "u1".into(),
            track: track(),
            is_favorite: true,
            reason: SaveReason::UpdateUserRating,
            during_sync: false,
        })));

        wait_for(|| b.saved.load(Ordering::SeqCst) == 1 && a.saved.load(Ordering::SeqCst) == 1).await;
        assert_eq!(a.started.load(Ordering::SeqCst), 1);
        assert_eq!(b.stopped.load(Ordering::SeqCst), 1);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_nothing_dispatched_after_shutdown() {
        let hub = EventHub::new();
        let listener = Arc::new(Counting::default());
        hub.register(listener.clone());
        hub.start().await;
        hub.shutdown().await;

        assert!(!hub.publish(MediaEvent::PlaybackStarted(playback())));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(listener.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_late_registration_is_ignored() {
        let hub = EventHub::new();
        hub.start().await;
        let late = Arc::new(Counting::default());
        hub.register(late.clone());

        hub.publish(MediaEvent::PlaybackStarted(playback()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(late.started.load(Ordering::SeqCst), 0);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_handlers() {
        struct Slow(AtomicUsize);

        #[async_trait]
        impl MediaEventListener for Slow {
            fn name(&self) -> &'static str {
                "slow"
            }
            async fn playback_started(&self, _: &PlaybackEvent) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hub = EventHub::new();
        let slow = Arc::new(Slow(AtomicUsize::new(0)));
        hub.register(slow.clone());
        hub.start().await;

        hub.publish(MediaEvent::PlaybackStarted(playback()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.shutdown().await;

        assert_eq!(slow.0.load(Ordering::SeqCst), 1);
    }
}
