use thiserror::Error;
use tickwork_core::{AccessError, ConfigError};
use tickwork_jobs::JobQueueError;

/// Errors raised while compiling systems into a [`Plan`](crate::Plan).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("could not allocate {count} {what} for the execution plan")]
    Allocation { what: &'static str, count: usize },

    #[error(transparent)]
    TooManyResources(#[from] AccessError),
}

/// Errors raised while assembling an [`Engine`](crate::Engine).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("job queue error: {0}")]
    Jobs(#[from] JobQueueError),

    #[error("plan build error: {0}")]
    Build(#[from] BuildError),
}
