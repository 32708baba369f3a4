//! Compiles registered systems into a [`Plan`].
//!
//! For every stage, each ordered pair of systems is classified by what they
//! declared:
//!
//! * `A` reads something `B` writes: `A` runs after `B`.
//! * both write the same resource: the one later in `(stage, order)` sequence runs
//!   after the earlier one.
//!
//! At most one edge is recorded per pair. Before an edge is added, the graph built
//! so far is walked from the prospective dependency; if it already reaches the
//! dependent, the edge would close a cycle and is dropped with a warning instead.
//! All intermediate data lives in a bump arena that is reset on every build.

use std::sync::Arc;
use std::time::Instant;

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use tickwork_core::{AccessRecorder, ResourceId, ResourceRegistry, SchedulerConfig, Stage, System};
use tracing::{debug, trace, warn};

use crate::error::BuildError;
use crate::plan::{DroppedEdge, LocalIndex, Plan, Span, StageExecutor, StagePlan, SystemNode};

/// A system with its declared access copied into the arena, sorted for merging.
struct Declared<'a> {
    system: &'a Arc<dyn System>,
    stage: Stage,
    order: i32,
    writes: &'a [ResourceId],
    reads: &'a [ResourceId],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Independent,
    /// The dependent reads what the dependency writes.
    ReadAfterWrite,
    /// Both write a shared resource; sequence order breaks the tie.
    WriteAfterWrite,
}

/// Reusable plan compiler.
pub struct PlanBuilder {
    arena: Bump,
    max_resources_per_system: usize,
    writes: Vec<ResourceId>,
    reads: Vec<ResourceId>,
}

impl PlanBuilder {
    pub fn new(max_resources_per_system: usize) -> Self {
        Self {
            arena: Bump::new(),
            max_resources_per_system,
            writes: Vec::with_capacity(max_resources_per_system),
            reads: Vec::with_capacity(max_resources_per_system),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_resources_per_system)
    }

    /// Build a plan for `systems`, resolving resource ids through `registry`.
    ///
    /// Building the same list twice yields structurally identical plans.
    pub fn build(
        &mut self,
        systems: &[Arc<dyn System>],
        registry: &ResourceRegistry,
    ) -> Result<Plan, BuildError> {
        let started = Instant::now();
        self.arena.reset();
        let arena = &self.arena;

        let mut declared: BumpVec<Declared<'_>> = BumpVec::with_capacity_in(systems.len(), arena);
        for system in systems {
            let mut access = AccessRecorder::new(
                system.name(),
                registry,
                &mut self.writes,
                &mut self.reads,
                self.max_resources_per_system,
            );
            system.declare(&mut access);
            access.finish()?;

            let writes = arena.alloc_slice_copy(&self.writes);
            writes.sort_unstable();
            let reads = arena.alloc_slice_copy(&self.reads);
            reads.sort_unstable();
            declared.push(Declared {
                system,
                stage: system.stage(),
                order: system.order(),
                writes,
                reads,
            });
        }
        // Stable, so equal keys keep registration order.
        declared.sort_by_key(|d| (d.stage, d.order));

        let mut nodes = Vec::new();
        reserve(&mut nodes, declared.len(), "system nodes")?;
        let mut stages = Vec::new();
        reserve(&mut stages, Stage::COUNT, "stage tables")?;
        let mut dependencies = Vec::new();
        let mut dependents = Vec::new();
        let mut dropped = Vec::new();

        let mut stack: BumpVec<usize> = BumpVec::new_in(arena);
        let mut visited: BumpVec<bool> = BumpVec::new_in(arena);

        for stage in Stage::ALL {
            let start = declared.partition_point(|d| d.stage < stage);
            let end = declared.partition_point(|d| d.stage <= stage);
            let members = &declared[start..end];

            let mut adjacency: BumpVec<BumpVec<usize>> =
                BumpVec::with_capacity_in(members.len(), arena);
            adjacency.extend((0..members.len()).map(|_| BumpVec::new_in(arena)));

            for a in 0..members.len() {
                for b in 0..members.len() {
                    if a == b {
                        continue;
                    }
                    let relation = classify(a, &members[a], b, &members[b]);
                    if relation == Relation::Independent {
                        continue;
                    }
                    if reaches(&adjacency, b, a, &mut stack, &mut visited) {
                        let edge = DroppedEdge {
                            stage,
                            dependent: members[a].system.name().to_string(),
                            dependency: members[b].system.name().to_string(),
                        };
                        warn!(
                            stage = %stage,
                            dependent = %edge.dependent,
                            dependency = %edge.dependency,
                            "Dependency cycle detected, dropping edge"
                        );
                        dropped.push(edge);
                        continue;
                    }
                    trace!(
                        stage = %stage,
                        dependent = members[a].system.name(),
                        dependency = members[b].system.name(),
                        ?relation,
                        "edge"
                    );
                    adjacency[a].push(b);
                }
            }

            let edge_count: usize = adjacency.iter().map(|deps| deps.len()).sum();
            reserve(&mut dependencies, edge_count, "dependency edges")?;
            reserve(&mut dependents, edge_count, "dependent edges")?;

            let mut inverse: BumpVec<BumpVec<usize>> =
                BumpVec::with_capacity_in(members.len(), arena);
            inverse.extend((0..members.len()).map(|_| BumpVec::new_in(arena)));
            for (a, deps) in adjacency.iter().enumerate() {
                for &b in deps.iter() {
                    inverse[b].push(a);
                }
            }

            let first_node = nodes.len();
            for (i, member) in members.iter().enumerate() {
                let dep_start = dependencies.len();
                dependencies.extend(adjacency[i].iter().map(|&b| LocalIndex::new(b)));
                let inv_start = dependents.len();
                dependents.extend(inverse[i].iter().map(|&a| LocalIndex::new(a)));
                nodes.push(SystemNode {
                    system: Arc::clone(member.system),
                    mode: member.system.mode(),
                    dependencies: Span::new(dep_start, dependencies.len()),
                    dependents: Span::new(inv_start, dependents.len()),
                });
            }
            stages.push(StagePlan {
                stage,
                nodes: Span::new(first_node, nodes.len()),
                executor: StageExecutor::for_stage(stage),
            });
        }

        debug!(
            systems = nodes.len(),
            edges = dependencies.len(),
            dropped = dropped.len(),
            arena_bytes = self.arena.allocated_bytes(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Built execution plan"
        );

        Ok(Plan {
            nodes,
            dependencies,
            dependents,
            stages,
            dropped,
        })
    }
}

impl std::fmt::Debug for PlanBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("max_resources_per_system", &self.max_resources_per_system)
            .field("arena_bytes", &self.arena.allocated_bytes())
            .finish()
    }
}

fn classify(a_index: usize, a: &Declared<'_>, b_index: usize, b: &Declared<'_>) -> Relation {
    if overlaps(a.reads, b.writes) {
        Relation::ReadAfterWrite
    } else if b_index < a_index && overlaps(a.writes, b.writes) {
        Relation::WriteAfterWrite
    } else {
        Relation::Independent
    }
}

/// Whether two sorted id lists share an element.
fn overlaps(a: &[ResourceId], b: &[ResourceId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

/// Depth-first search over recorded dependencies from `from`, looking for `target`.
fn reaches(
    adjacency: &[BumpVec<'_, usize>],
    from: usize,
    target: usize,
    stack: &mut BumpVec<'_, usize>,
    visited: &mut BumpVec<'_, bool>,
) -> bool {
    stack.clear();
    visited.clear();
    visited.resize(adjacency.len(), false);
    stack.push(from);
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if std::mem::replace(&mut visited[node], true) {
            continue;
        }
        stack.extend(adjacency[node].iter().copied());
    }
    false
}

fn reserve<T>(vec: &mut Vec<T>, additional: usize, what: &'static str) -> Result<(), BuildError> {
    vec.try_reserve(additional).map_err(|_| BuildError::Allocation {
        what,
        count: additional,
    })
}
