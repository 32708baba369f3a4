//! The compiled, immutable execution plan.
//!
//! All nodes live in one array ordered by stage; each stage owns a contiguous
//! slice of it. Dependency lists are spans into a single shared index array and
//! hold [`LocalIndex`] values relative to the start of the node's own stage, so a
//! stage's graph is self-contained.

use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use tickwork_core::{ExecutionMode, Stage, System};
use tracing::debug;

/// Position of a node in the plan's global node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeIndex(u32);

impl NodeIndex {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Position of a node relative to the first node of its stage.
///
/// Deliberately not convertible to or comparable with [`NodeIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LocalIndex(u32);

impl LocalIndex {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for LocalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Half-open span into one of the plan's shared arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Span {
    pub(crate) start: u32,
    pub(crate) end: u32,
}

impl Span {
    pub(crate) fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    pub(crate) fn range(self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    pub(crate) fn len(self) -> usize {
        (self.end - self.start) as usize
    }
}

/// How a stage's nodes are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageExecutor {
    /// One at a time on the calling thread, in array order.
    Sequential,
    /// One at a time on the calling thread, in reverse array order.
    ReverseSequential,
    /// Dependency-respecting, concurrent on the job queue.
    Concurrent,
}

impl StageExecutor {
    /// Bootstrap and teardown run in registration order; everything else is concurrent.
    pub fn for_stage(stage: Stage) -> Self {
        if stage == Stage::first() {
            StageExecutor::Sequential
        } else if stage == Stage::last() {
            StageExecutor::ReverseSequential
        } else {
            StageExecutor::Concurrent
        }
    }
}

/// One system compiled into its stage's graph.
pub struct SystemNode {
    pub(crate) system: Arc<dyn System>,
    pub(crate) mode: ExecutionMode,
    pub(crate) dependencies: Span,
    pub(crate) dependents: Span,
}

impl SystemNode {
    pub fn name(&self) -> &str {
        self.system.name()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn system(&self) -> &Arc<dyn System> {
        &self.system
    }

    /// Number of in-stage predecessors.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }
}

impl std::fmt::Debug for SystemNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemNode")
            .field("name", &self.name())
            .field("mode", &self.mode)
            .field("dependencies", &self.dependencies.range())
            .finish()
    }
}

/// A stage's slice of the node array and its executor.
#[derive(Debug, Clone, Copy)]
pub struct StagePlan {
    pub(crate) stage: Stage,
    pub(crate) nodes: Span,
    pub(crate) executor: StageExecutor,
}

impl StagePlan {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn executor(&self) -> StageExecutor {
        self.executor
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An edge discarded because it would have closed a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedEdge {
    pub stage: Stage,
    /// System that would have waited.
    pub dependent: String,
    /// System it would have waited on.
    pub dependency: String,
}

/// Immutable execution plan produced by [`PlanBuilder`](crate::PlanBuilder).
pub struct Plan {
    pub(crate) nodes: Vec<SystemNode>,
    pub(crate) dependencies: Vec<LocalIndex>,
    pub(crate) dependents: Vec<LocalIndex>,
    pub(crate) stages: Vec<StagePlan>,
    pub(crate) dropped: Vec<DroppedEdge>,
}

impl Plan {
    pub fn stage(&self, stage: Stage) -> &StagePlan {
        &self.stages[stage.index()]
    }

    pub fn stages(&self) -> &[StagePlan] {
        &self.stages
    }

    pub fn executor(&self, stage: Stage) -> StageExecutor {
        self.stage(stage).executor
    }

    /// Nodes of one stage, indexable by [`LocalIndex::get`].
    pub fn nodes(&self, stage: Stage) -> &[SystemNode] {
        &self.nodes[self.stage(stage).nodes.range()]
    }

    pub fn node(&self, index: NodeIndex) -> &SystemNode {
        &self.nodes[index.get()]
    }

    /// Translate a stage-local index into a global one.
    pub fn global_index(&self, stage: Stage, local: LocalIndex) -> NodeIndex {
        NodeIndex::new(self.stage(stage).nodes.start as usize + local.get())
    }

    /// In-stage predecessors of a node.
    pub fn dependencies(&self, node: &SystemNode) -> &[LocalIndex] {
        &self.dependencies[node.dependencies.range()]
    }

    /// In-stage successors of a node.
    pub fn dependents(&self, node: &SystemNode) -> &[LocalIndex] {
        &self.dependents[node.dependents.range()]
    }

    /// Edges of one stage as `(dependent, dependency)` pairs, in node order.
    pub fn edges(&self, stage: Stage) -> Vec<(LocalIndex, LocalIndex)> {
        self.nodes(stage)
            .iter()
            .enumerate()
            .flat_map(|(i, node)| {
                self.dependencies(node)
                    .iter()
                    .map(move |dep| (LocalIndex::new(i), *dep))
            })
            .collect()
    }

    pub fn system_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Edges dropped to break cycles, in discovery order.
    pub fn dropped_edges(&self) -> &[DroppedEdge] {
        &self.dropped
    }

    /// Write the stage table to the debug log.
    pub fn log_summary(&self) {
        debug!(
            systems = self.system_count(),
            edges = self.edge_count(),
            dropped = self.dropped.len(),
            "Execution plan:"
        );
        for stage in &self.stages {
            if stage.is_empty() {
                continue;
            }
            debug!("  {} ({:?}, {} systems)", stage.stage, stage.executor, stage.len());
            for (i, node) in self.nodes(stage.stage).iter().enumerate() {
                let deps: Vec<String> = self
                    .dependencies(node)
                    .iter()
                    .map(|d| self.nodes(stage.stage)[d.get()].name().to_string())
                    .collect();
                debug!("    #{} {} [{:?}] after {:?}", i, node.name(), node.mode, deps);
            }
        }
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("stages", &self.stages)
            .field("nodes", &self.nodes)
            .field("dropped", &self.dropped)
            .finish()
    }
}
