pub mod config;
pub mod error;
pub mod resource;
pub mod stage;
pub mod system;

pub use config::SchedulerConfig;
pub use error::*;
pub use resource::{ResourceId, ResourceRegistry};
pub use stage::{ExecutionMode, Stage};
pub use system::{AccessRecorder, FrameContext, System, SystemDescriptor};
