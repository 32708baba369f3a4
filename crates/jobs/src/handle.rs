use serde::Serialize;

/// Lifecycle of a job slot.
///
/// `Available → Claimed → Waiting → Executing → Completed | Error`, then back to
/// `Available` either automatically (auto-reset jobs) or through
/// [`JobQueue::reset`](crate::JobQueue::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum JobState {
    Available = 0,
    Claimed = 1,
    Waiting = 2,
    Executing = 3,
    Completed = 4,
    Error = 5,
}

impl JobState {
    pub(crate) fn from_u8(raw: u8) -> JobState {
        match raw {
            0 => JobState::Available,
            1 => JobState::Claimed,
            2 => JobState::Waiting,
            3 => JobState::Executing,
            4 => JobState::Completed,
            _ => JobState::Error,
        }
    }

    /// Whether the job body has returned (successfully or not).
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

/// Versioned reference to a job slot.
///
/// The version is captured at enqueue time; once the slot is recycled its version
/// moves on and the handle stops matching, so a stale handle can never observe a
/// newer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    slot: u32,
    version: u8,
}

impl JobHandle {
    /// Returned when a job could not be enqueued.
    pub const INVALID: JobHandle = JobHandle {
        slot: u32::MAX,
        version: 0,
    };

    pub(crate) fn new(slot: u32, version: u8) -> Self {
        Self { slot, version }
    }

    pub fn is_valid(&self) -> bool {
        self.slot != u32::MAX
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot as usize
    }

    pub(crate) fn version(&self) -> u8 {
        self.version
    }

    pub(crate) fn invalidate(&mut self) {
        *self = Self::INVALID;
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::INVALID
    }
}
