use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The import job stopped because its cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared between the import job and the favorite listener. While a job holds
/// the scope, favorite changes are the job's own writes and must not be echoed
/// back to Last.fm.
#[derive(Debug, Clone, Default)]
pub struct SyncScope {
    suppress_writes: Arc<AtomicBool>,
}

impl SyncScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.suppress_writes.load(Ordering::SeqCst)
    }

    /// Raises the flag until the returned guard is dropped. Returns `None` if
    /// another job already holds it.
    pub fn enter(&self) -> Option<SyncScopeGuard> {
        self.suppress_writes
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SyncScopeGuard {
                flag: self.suppress_writes.clone(),
            })
    }
}

#[derive(Debug)]
pub struct SyncScopeGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for SyncScopeGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Receives job progress in percent (0-100).
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

/// The slice of overall progress a sub-step owns, as fractions of 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub start: f64,
    pub end: f64,
}

impl ProgressWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn full() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Window for item `index` of `count` equal slices.
    pub fn slice(index: usize, count: usize) -> Self {
        if count == 0 {
            return Self::full();
        }
        Self::new(index as f64 / count as f64, (index + 1) as f64 / count as f64)
    }

    /// Maps a fraction of this step onto overall percent.
    pub fn percent(&self, fraction: f64) -> f64 {
        (fraction.clamp(0.0, 1.0) * (self.end - self.start) + self.start) * 100.0
    }
}
