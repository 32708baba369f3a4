//! Dependency-aware stage scheduling on top of the tickwork job queue.
//!
//! Systems declare which resources they read and write; [`PlanBuilder`] turns
//! those declarations into a per-stage dependency graph, and [`Engine`] replays
//! the graph every frame, running independent systems concurrently.

mod builder;
mod engine;
pub mod error;
mod executor;
pub mod metrics;
pub mod plan;

pub use builder::PlanBuilder;
pub use engine::Engine;
pub use error::{BuildError, EngineError};
pub use metrics::SchedulerMetrics;
pub use plan::{DroppedEdge, LocalIndex, NodeIndex, Plan, StageExecutor, StagePlan, SystemNode};
