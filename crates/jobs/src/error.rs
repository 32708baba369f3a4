use thiserror::Error;

/// Errors raised while constructing a [`JobQueue`](crate::JobQueue).
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job queue needs at least one worker thread")]
    NoWorkers,

    #[error("job queue capacity must be a nonzero power of two, got {0}")]
    InvalidCapacity(usize),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
