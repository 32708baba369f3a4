use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Generation counter bumped every time a job body finishes.
///
/// Lets a joining thread sleep until some job completes instead of spinning. The
/// worker side stays lock-free unless somebody is actually asleep.
#[derive(Debug, Default)]
pub(crate) struct CompletionSignal {
    generation: AtomicU64,
    sleepers: AtomicUsize,
    lock: Mutex<()>,
    changed: Condvar,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn notify(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.changed.notify_all();
        }
    }

    /// Sleep until the generation moves past `seen` or `timeout` elapses.
    /// Returns whether it moved.
    pub(crate) fn wait(&self, seen: u64, timeout: Duration) -> bool {
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |_| self.generation() == seen)
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
        self.generation() != seen
    }
}
