use serde::{Deserialize, Serialize};

/// A fixed phase of the frame (or of startup/shutdown).
///
/// Stages are totally ordered; the declaration order below is the execution order.
/// Dependency edges never cross a stage boundary, so ordering between systems in
/// different stages comes from this order alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Startup,
    PreInit,
    Init,
    First,
    PreUpdate,
    Update,
    PostUpdate,
    Last,
    Shutdown,
    PostShutdown,
    EndOfLife,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 11] = [
        Stage::Startup,
        Stage::PreInit,
        Stage::Init,
        Stage::First,
        Stage::PreUpdate,
        Stage::Update,
        Stage::PostUpdate,
        Stage::Last,
        Stage::Shutdown,
        Stage::PostShutdown,
        Stage::EndOfLife,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Stages run once at engine start.
    pub const STARTUP: [Stage; 3] = [Stage::Startup, Stage::PreInit, Stage::Init];

    /// Stages replayed every frame.
    pub const FRAME: [Stage; 5] = [
        Stage::First,
        Stage::PreUpdate,
        Stage::Update,
        Stage::PostUpdate,
        Stage::Last,
    ];

    /// Stages run once at engine teardown.
    pub const SHUTDOWN: [Stage; 3] = [Stage::Shutdown, Stage::PostShutdown, Stage::EndOfLife];

    /// Position of this stage in [`Stage::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The first declared stage.
    pub fn first() -> Stage {
        Self::ALL[0]
    }

    /// The last declared stage.
    pub fn last() -> Stage {
        Self::ALL[Self::COUNT - 1]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Startup => write!(f, "Startup"),
            Stage::PreInit => write!(f, "PreInit"),
            Stage::Init => write!(f, "Init"),
            Stage::First => write!(f, "First"),
            Stage::PreUpdate => write!(f, "PreUpdate"),
            Stage::Update => write!(f, "Update"),
            Stage::PostUpdate => write!(f, "PostUpdate"),
            Stage::Last => write!(f, "Last"),
            Stage::Shutdown => write!(f, "Shutdown"),
            Stage::PostShutdown => write!(f, "PostShutdown"),
            Stage::EndOfLife => write!(f, "EndOfLife"),
        }
    }
}

/// How a system node is dispatched once it becomes runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Submitted to the job queue and run on a worker thread.
    #[default]
    Job,
    /// Run directly on the scheduling thread. Must be near-zero cost and never block.
    Inline,
    /// Like [`ExecutionMode::Inline`], but the run is timed and a warning is logged
    /// when it exceeds the configured inline budget.
    InlineChecked,
}

impl ExecutionMode {
    /// Whether nodes with this mode bypass the job queue.
    pub fn is_inline(self) -> bool {
        matches!(self, ExecutionMode::Inline | ExecutionMode::InlineChecked)
    }
}
