//! The registration contract between systems and the scheduler.

use std::any::Any;
use std::sync::Arc;

use crate::error::AccessError;
use crate::resource::{ResourceId, ResourceRegistry};
use crate::stage::{ExecutionMode, Stage};

/// Per-run context handed to every system body.
#[derive(Debug, Clone)]
pub struct FrameContext {
    frame: u64,
    stage: Stage,
    resources: Arc<ResourceRegistry>,
}

impl FrameContext {
    pub fn new(frame: u64, stage: Stage, resources: Arc<ResourceRegistry>) -> Self {
        Self {
            frame,
            stage,
            resources,
        }
    }

    /// Frame counter. Startup stages see frame 0.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Shorthand for `resources().get::<T>()`.
    pub fn resource<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resources.get::<T>()
    }
}

/// A unit of per-stage work with declared resource access.
///
/// `declare` is called exactly once, while the plan is built. It must record every
/// resource the system touches in `run`: an undeclared access is invisible to the
/// scheduler and can race with other systems.
pub trait System: Send + Sync {
    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Job
    }

    /// Tie-break hint inside a stage. Lower runs earlier when nothing else decides.
    fn order(&self) -> i32 {
        0
    }

    /// Record the resources this system reads and writes.
    fn declare(&self, access: &mut AccessRecorder<'_>);

    /// Execute the system body.
    fn run(&self, ctx: &FrameContext);
}

/// Records one system's resource access into caller-owned bounded buffers.
///
/// Each accessor returns the resource id and records the access in the same call,
/// so a system can keep the ids it needs for later lookups.
pub struct AccessRecorder<'a> {
    system: &'a str,
    registry: &'a ResourceRegistry,
    writes: &'a mut Vec<ResourceId>,
    reads: &'a mut Vec<ResourceId>,
    limit: usize,
    overflow: Option<AccessError>,
}

impl<'a> AccessRecorder<'a> {
    /// Create a recorder over the given buffers. Both buffers are cleared.
    pub fn new(
        system: &'a str,
        registry: &'a ResourceRegistry,
        writes: &'a mut Vec<ResourceId>,
        reads: &'a mut Vec<ResourceId>,
        limit: usize,
    ) -> Self {
        writes.clear();
        reads.clear();
        Self {
            system,
            registry,
            writes,
            reads,
            limit,
            overflow: None,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        self.registry
    }

    /// Declare write access to the resource type `T`.
    pub fn writes<T: Any>(&mut self) -> ResourceId {
        let id = self.registry.id_of::<T>();
        self.writes_id(id)
    }

    /// Declare read-only access to the resource type `T`.
    pub fn reads<T: Any>(&mut self) -> ResourceId {
        let id = self.registry.id_of::<T>();
        self.reads_id(id)
    }

    pub fn writes_named(&mut self, name: &str) -> ResourceId {
        let id = self.registry.named(name);
        self.writes_id(id)
    }

    pub fn reads_named(&mut self, name: &str) -> ResourceId {
        let id = self.registry.named(name);
        self.reads_id(id)
    }

    pub fn writes_id(&mut self, id: ResourceId) -> ResourceId {
        record(self.writes, id, self.limit, "mutable", self.system, &mut self.overflow);
        id
    }

    pub fn reads_id(&mut self, id: ResourceId) -> ResourceId {
        record(self.reads, id, self.limit, "read-only", self.system, &mut self.overflow);
        id
    }

    /// Close the declaration, reporting the first overflow if one happened.
    pub fn finish(self) -> Result<(), AccessError> {
        match self.overflow {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn record(
    list: &mut Vec<ResourceId>,
    id: ResourceId,
    limit: usize,
    kind: &'static str,
    system: &str,
    overflow: &mut Option<AccessError>,
) {
    if list.contains(&id) {
        return;
    }
    if list.len() >= limit {
        if overflow.is_none() {
            *overflow = Some(AccessError::Overflow {
                system: system.to_string(),
                kind,
                limit,
            });
        }
        return;
    }
    list.push(id);
}

type DeclareFn = Box<dyn Fn(&mut AccessRecorder<'_>) + Send + Sync>;
type RunFn = Box<dyn Fn(&FrameContext) + Send + Sync>;

/// A [`System`] assembled from closures.
pub struct SystemDescriptor {
    name: String,
    stage: Stage,
    mode: ExecutionMode,
    order: i32,
    declare: Option<DeclareFn>,
    run: RunFn,
}

impl SystemDescriptor {
    pub fn new<F>(name: impl Into<String>, stage: Stage, run: F) -> Self
    where
        F: Fn(&FrameContext) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stage,
            mode: ExecutionMode::Job,
            order: 0,
            declare: None,
            run: Box::new(run),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_access<F>(mut self, declare: F) -> Self
    where
        F: Fn(&mut AccessRecorder<'_>) + Send + Sync + 'static,
    {
        self.declare = Some(Box::new(declare));
        self
    }

    pub fn into_system(self) -> Arc<dyn System> {
        Arc::new(self)
    }
}

impl System for SystemDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn declare(&self, access: &mut AccessRecorder<'_>) {
        if let Some(declare) = &self.declare {
            declare(access);
        }
    }

    fn run(&self, ctx: &FrameContext) {
        (self.run)(ctx)
    }
}

impl std::fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("mode", &self.mode)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
