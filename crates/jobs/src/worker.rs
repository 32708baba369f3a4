//! Worker dispatch loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error};

use crate::handle::JobState;
use crate::queue::Shared;
use crate::stats::QueueCounters;

pub(crate) fn run(shared: Arc<Shared>, index: usize) {
    debug!(worker = index, "worker started");

    loop {
        // Bounded wait so shutdown is noticed even if a wake-up goes missing.
        let woke = shared.semaphore.acquire_timeout(shared.idle_wait);
        if !shared.active[index].load(Ordering::Acquire) {
            break;
        }
        if !woke {
            continue;
        }

        match claim_next(&shared) {
            Some((slot, version)) => execute(&shared, index, slot, version),
            None => {
                // Every permit matches a `Waiting` slot, so this means a claim was
                // lost or duplicated. Hand the permit back rather than drop the job.
                error!(worker = index, "no claimable job found after a full ring scan");
                shared.semaphore.release(1);
                std::thread::yield_now();
            }
        }
    }

    debug!(worker = index, "worker stopped");
}

/// Claim the next `Waiting` slot, scanning at most one full pass of the ring.
/// Returns the slot index and the version of the claimed job.
fn claim_next(shared: &Shared) -> Option<(usize, u8)> {
    for _ in 0..shared.slots.len() {
        let index = shared.next_run.fetch_add(1, Ordering::Relaxed) & shared.mask;
        if let Some(version) = shared.slots[index].transition(JobState::Waiting, JobState::Executing)
        {
            return Some((index, version));
        }
    }
    None
}

fn execute(shared: &Shared, worker: usize, index: usize, version: u8) {
    let slot = &shared.slots[index];
    // Safety: this worker moved the slot to `Executing` and owns the payload now.
    let Some(job) = (unsafe { (*slot.payload.get()).take() }) else {
        error!(worker, slot = index, "claimed job slot has no payload");
        slot.publish(version, JobState::Error);
        shared.completions.notify();
        return;
    };
    let auto_reset = slot.auto_reset.load(Ordering::Relaxed);

    match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        Ok(()) => {
            QueueCounters::bump(&shared.counters.executed);
            let next = if auto_reset {
                JobState::Available
            } else {
                JobState::Completed
            };
            slot.publish(version, next);
        }
        Err(payload) => {
            QueueCounters::bump(&shared.counters.faulted);
            let message = panic_message(payload.as_ref());
            if cfg!(debug_assertions) {
                error!(worker, slot = index, %message, "job panicked");
                let next = if auto_reset {
                    JobState::Available
                } else {
                    JobState::Error
                };
                slot.publish(version, next);
            } else {
                // A job that unwound may have left shared state half-written.
                error!(worker, slot = index, %message, "job panicked, aborting");
                std::process::abort();
            }
        }
    }
    shared.completions.notify();
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
