//! Fixed-capacity job ring with a pool of dedicated worker threads.
//!
//! Jobs are opaque [`Runnable`] payloads. Submission and claiming are lock-free
//! compare-and-swap loops over an arena of slots; idle workers park on a counting
//! semaphore. Completion is observed through versioned [`JobHandle`]s that stay
//! safe after their slot has been recycled. Threads that join on jobs can sleep
//! on a completion counter instead of spinning.

pub mod error;
pub mod handle;
pub mod queue;
pub mod runnable;
mod semaphore;
mod signal;
pub mod stats;
mod worker;

pub use error::JobQueueError;
pub use handle::{JobHandle, JobState};
pub use queue::JobQueue;
pub use runnable::{Runnable, INLINE_CAPACITY};
pub use stats::QueueStats;
pub use worker::panic_message;
