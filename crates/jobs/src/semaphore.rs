use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Counting semaphore used to park idle workers.
///
/// Only idle workers touch the mutex; the enqueue path takes it briefly to post a
/// permit and never waits on it.
#[derive(Debug, Default)]
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `n` permits, waking up to `n` waiters.
    pub(crate) fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += n;
        drop(permits);
        if n == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// Take one permit, waiting at most `timeout`. Returns whether a permit was taken.
    pub(crate) fn acquire_timeout(&self, timeout: Duration) -> bool {
        let permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut permits, _) = self
            .available
            .wait_timeout_while(permits, timeout, |p| *p == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    #[cfg(test)]
    pub(crate) fn permits(&self) -> usize {
        *self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
