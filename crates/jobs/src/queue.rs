use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use tickwork_core::SchedulerConfig;
use tracing::{debug, error, info, warn};

use crate::error::JobQueueError;
use crate::handle::{JobHandle, JobState};
use crate::runnable::Runnable;
use crate::semaphore::Semaphore;
use crate::signal::CompletionSignal;
use crate::stats::{QueueCounters, QueueStats};
use crate::worker;

/// Version in the high byte, [`JobState`] in the low byte.
fn pack(version: u8, state: JobState) -> u16 {
    (u16::from(version) << 8) | state as u16
}

fn unpack(tag: u16) -> (u8, JobState) {
    ((tag >> 8) as u8, JobState::from_u8(tag as u8))
}

/// One entry of the job ring.
pub(crate) struct Slot {
    /// Version and state in one word, so a handle check and a state change are a
    /// single atomic step.
    tag: AtomicU16,
    pub(crate) auto_reset: AtomicBool,
    /// Written only by the thread that moved the slot to `Claimed`, taken only by
    /// the worker that moved it to `Executing`.
    pub(crate) payload: UnsafeCell<Option<Runnable>>,
}

// Safety: `payload` is only touched by the single thread that owns the slot
// according to its state, and every ownership hand-off is a release/acquire pair.
unsafe impl Sync for Slot {}

impl Slot {
    fn new() -> Self {
        Self {
            tag: AtomicU16::new(pack(0, JobState::Available)),
            auto_reset: AtomicBool::new(false),
            payload: UnsafeCell::new(None),
        }
    }

    pub(crate) fn load(&self) -> (u8, JobState) {
        unpack(self.tag.load(Ordering::Acquire))
    }

    pub(crate) fn load_state(&self) -> JobState {
        self.load().1
    }

    /// Move from `from` to `to` whatever the version. Returns the version on success.
    pub(crate) fn transition(&self, from: JobState, to: JobState) -> Option<u8> {
        let mut current = self.tag.load(Ordering::Relaxed);
        loop {
            let (version, state) = unpack(current);
            if state != from {
                return None;
            }
            match self.tag.compare_exchange_weak(
                current,
                pack(version, to),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(version),
                Err(actual) => current = actual,
            }
        }
    }

    /// Store a new tag. Only the thread that currently owns the slot may call this.
    pub(crate) fn publish(&self, version: u8, state: JobState) {
        self.tag.store(pack(version, state), Ordering::Release);
    }

    /// Return a finished job of exactly `version` to `Available`.
    fn release(&self, version: u8) -> bool {
        [JobState::Completed, JobState::Error].into_iter().any(|finished| {
            self.tag
                .compare_exchange(
                    pack(version, finished),
                    pack(version, JobState::Available),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
        })
    }
}

/// State shared between the queue front-end and its worker threads.
pub(crate) struct Shared {
    pub(crate) slots: Box<[CachePadded<Slot>]>,
    pub(crate) mask: usize,
    /// Cursor for the next slot to try when enqueuing.
    pub(crate) next_free: CachePadded<AtomicUsize>,
    /// Cursor for the next slot a worker tries to claim.
    pub(crate) next_run: CachePadded<AtomicUsize>,
    pub(crate) active: Box<[CachePadded<AtomicBool>]>,
    pub(crate) semaphore: Semaphore,
    pub(crate) idle_wait: Duration,
    pub(crate) counters: QueueCounters,
    pub(crate) completions: CompletionSignal,
    /// Set once by `shutdown`; later submissions are rejected.
    pub(crate) stopped: AtomicBool,
}

/// Multi-producer, multi-consumer job ring driven by a fixed worker pool.
///
/// All methods take `&self`; share the queue behind an `Arc` to submit from any
/// thread. Dropping the queue shuts the pool down.
pub struct JobQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create a queue with `capacity` slots and start `worker_count` workers.
    pub fn new(
        worker_count: usize,
        capacity: usize,
        idle_wait: Duration,
    ) -> Result<Self, JobQueueError> {
        if worker_count == 0 {
            return Err(JobQueueError::NoWorkers);
        }
        if capacity == 0 || !capacity.is_power_of_two() || capacity > u32::MAX as usize {
            return Err(JobQueueError::InvalidCapacity(capacity));
        }
        if let Ok(cores) = std::thread::available_parallelism() {
            if worker_count > cores.get() {
                warn!(
                    workers = worker_count,
                    cores = cores.get(),
                    "more job workers than logical cores"
                );
            }
        }

        let slots = (0..capacity).map(|_| CachePadded::new(Slot::new())).collect();
        let active = (0..worker_count)
            .map(|_| CachePadded::new(AtomicBool::new(true)))
            .collect();
        let shared = Arc::new(Shared {
            slots,
            mask: capacity - 1,
            next_free: CachePadded::new(AtomicUsize::new(0)),
            next_run: CachePadded::new(AtomicUsize::new(0)),
            active,
            semaphore: Semaphore::new(),
            idle_wait,
            counters: QueueCounters::default(),
            completions: CompletionSignal::new(),
            stopped: AtomicBool::new(false),
        });

        let queue = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
        };
        // On spawn failure `queue` is dropped here, which stops the threads already started.
        for index in 0..worker_count {
            let shared = Arc::clone(&queue.shared);
            let handle = std::thread::Builder::new()
                .name(format!("tickwork-worker-{index}"))
                .spawn(move || worker::run(shared, index))?;
            queue.lock_workers().push(handle);
        }

        info!(workers = worker_count, capacity, "Job queue started");
        Ok(queue)
    }

    /// Create a queue sized from the scheduler config.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, JobQueueError> {
        Self::new(
            config.resolved_worker_threads(),
            config.queue_capacity,
            config.idle_wait(),
        )
    }

    /// Submit a job. Never blocks.
    ///
    /// Returns [`JobHandle::INVALID`] when no free slot was found in one pass over
    /// the ring, or once the queue has been shut down; the job is dropped unrun in
    /// that case. Auto-reset jobs return their
    /// slot to `Available` as soon as they finish; other jobs stay `Completed` until
    /// [`reset`](Self::reset) is called.
    pub fn enqueue(&self, job: Runnable, auto_reset: bool) -> JobHandle {
        let shared = &*self.shared;
        if shared.stopped.load(Ordering::Acquire) {
            QueueCounters::bump(&shared.counters.rejected);
            warn!("job queue is shut down, rejecting job");
            return JobHandle::INVALID;
        }
        for _ in 0..shared.slots.len() {
            let index = shared.next_free.fetch_add(1, Ordering::Relaxed) & shared.mask;
            let slot = &shared.slots[index];
            let Some(previous) = slot.transition(JobState::Available, JobState::Claimed) else {
                continue;
            };

            let version = previous.wrapping_add(1);
            slot.auto_reset.store(auto_reset, Ordering::Relaxed);
            // Safety: this thread owns the slot while it is `Claimed`.
            unsafe { *slot.payload.get() = Some(job) };
            slot.publish(version, JobState::Waiting);

            QueueCounters::bump(&shared.counters.enqueued);
            shared.semaphore.release(1);
            return JobHandle::new(index as u32, version);
        }

        QueueCounters::bump(&shared.counters.rejected);
        debug!(capacity = shared.slots.len(), "job queue full, rejecting job");
        JobHandle::INVALID
    }

    /// Convenience wrapper over [`enqueue`](Self::enqueue) for closures.
    pub fn spawn<F>(&self, f: F, auto_reset: bool) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Runnable::new(f), auto_reset)
    }

    /// Whether the job behind `handle` has finished.
    ///
    /// True once the body returned, and also whenever the slot has moved on to a
    /// different version: the original job is gone. Invalid handles report true.
    pub fn is_completed(&self, handle: JobHandle) -> bool {
        let Some(slot) = self.slot(handle) else {
            return true;
        };
        let (version, state) = slot.load();
        version != handle.version() || !matches!(state, JobState::Waiting | JobState::Executing)
    }

    /// Raw slot state, for diagnostics. Not synchronized with `is_completed`.
    pub fn state(&self, handle: JobHandle) -> JobState {
        match self.slot(handle) {
            Some(slot) => slot.load_state(),
            None => JobState::Available,
        }
    }

    /// Release a finished job's slot for reuse. The handle is invalidated either way.
    ///
    /// Only a slot still holding this handle's version is released, so resetting
    /// through a stale copy never frees a newer job.
    pub fn reset(&self, handle: &mut JobHandle) {
        if let Some(slot) = self.slot(*handle) {
            slot.release(handle.version());
        }
        handle.invalidate();
    }

    /// Number of job bodies that have finished so far, successfully or not.
    pub fn completions(&self) -> u64 {
        self.shared.completions.generation()
    }

    /// Block until a job finishes after [`completions`](Self::completions) read
    /// `seen`, or until `timeout` passes. Returns whether one finished.
    pub fn wait_for_completion(&self, seen: u64, timeout: Duration) -> bool {
        self.shared.completions.wait(seen, timeout)
    }

    /// False once [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.active.len()
    }

    /// Snapshot of queue counters and current slot occupancy.
    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        QueueStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            executed: counters.executed.load(Ordering::Relaxed),
            faulted: counters.faulted.load(Ordering::Relaxed),
            in_flight: self
                .shared
                .slots
                .iter()
                .filter(|slot| slot.load_state() != JobState::Available)
                .count(),
            capacity: self.capacity(),
            workers: self.worker_count(),
        }
    }

    /// Stop and join every worker, then reject further submissions. Idempotent.
    ///
    /// Every slot must be `Available` by now: a job that was enqueued but never
    /// drained (or completed but never reset) is an engine bug.
    pub fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        if handles.is_empty() {
            return;
        }

        for flag in self.shared.active.iter() {
            flag.store(false, Ordering::Release);
        }
        self.shared.semaphore.release(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = index, "worker thread panicked");
            }
        }

        let undrained = self
            .shared
            .slots
            .iter()
            .filter(|slot| slot.load_state() != JobState::Available)
            .count();
        if undrained > 0 {
            error!(undrained, "job queue stopped with undrained slots");
            if !std::thread::panicking() {
                debug_assert_eq!(undrained, 0, "job queue stopped with undrained slots");
            }
        }
        info!("Job queue stopped");
    }

    fn slot(&self, handle: JobHandle) -> Option<&Slot> {
        if !handle.is_valid() {
            return None;
        }
        self.shared.slots.get(handle.slot()).map(|slot| &**slot)
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity())
            .field("workers", &self.worker_count())
            .finish()
    }
}
