use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a scrobble reservation blocks repeats of the same (user, track).
pub const SCROBBLE_DEDUP_TTL: Duration = Duration::from_secs(15);

/// Suppresses a second scrobble of the same track for the same user inside a
/// short window. Players often report the same stop twice.
#[derive(Debug)]
pub struct DuplicateScrobbleGuard {
    ttl: Duration,
    /// (user id, track id) -> expiry
    entries: Mutex<HashMap<(String, String), Instant>>,
}

impl Default for DuplicateScrobbleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplicateScrobbleGuard {
    pub fn new() -> Self {
        Self::with_ttl(SCROBBLE_DEDUP_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the pair was reserved within the TTL (a duplicate).
    /// Otherwise reserves it and returns `false`.
    pub fn check_and_reserve(&self, user_id: &str, track_id: &str) -> bool {
        self.check_and_reserve_at(user_id, track_id, Instant::now())
    }

    pub fn check_and_reserve_at(&self, user_id: &str, track_id: &str, now: Instant) -> bool {
        // Lookup and insert happen under one lock.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let key = (user_id.to_string(), track_id.to_string());
        if let Some(expiry) = entries.get(&key) {
            if *expiry > now {
                return true;
            }
        }

        // Clean up stale reservations while we're here
        entries.retain(|_, expiry| *expiry > now);
        entries.insert(key, now + self.ttl);
        false
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
