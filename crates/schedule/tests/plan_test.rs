//! Plan construction over generated workloads.

use std::sync::Arc;

use tickwork_core::{FrameContext, ResourceRegistry, Stage, System, SystemDescriptor};
use tickwork_schedule::{LocalIndex, Plan, PlanBuilder, StageExecutor};

const RESOURCES: [&str; 6] = ["mesh", "audio", "input", "camera", "physics", "ui"];
const STAGES: [Stage; 3] = [Stage::PreUpdate, Stage::Update, Stage::PostUpdate];

#[derive(Debug, Clone, Copy)]
struct Access {
    stage: Stage,
    resource: &'static str,
    write: bool,
}

/// Deterministic pseudo-random workload: each system touches exactly one resource.
fn workload(count: usize, mut seed: u64) -> Vec<Access> {
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as usize
    };
    (0..count)
        .map(|_| Access {
            stage: STAGES[next() % STAGES.len()],
            resource: RESOURCES[next() % RESOURCES.len()],
            write: next() % 3 != 0,
        })
        .collect()
}

fn systems(accesses: &[Access]) -> Vec<Arc<dyn System>> {
    accesses
        .iter()
        .enumerate()
        .map(|(i, access)| {
            let access = *access;
            SystemDescriptor::new(format!("sys-{i}"), access.stage, |_: &FrameContext| {})
                .with_access(move |a| {
                    if access.write {
                        a.writes_named(access.resource);
                    } else {
                        a.reads_named(access.resource);
                    }
                })
                .into_system()
        })
        .collect()
}

fn build(systems: &[Arc<dyn System>]) -> Plan {
    let registry = ResourceRegistry::new();
    PlanBuilder::new(8).build(systems, &registry).unwrap()
}

fn names(plan: &Plan, stage: Stage) -> Vec<String> {
    plan.nodes(stage).iter().map(|n| n.name().to_string()).collect()
}

#[test]
fn edges_match_declared_conflicts() {
    let accesses = workload(60, 7);
    let plan = build(&systems(&accesses));
    assert!(plan.dropped_edges().is_empty());

    for stage in STAGES {
        // Nodes keep registration order within a stage when no order is set.
        let members: Vec<Access> = accesses.iter().copied().filter(|a| a.stage == stage).collect();
        assert_eq!(plan.stage(stage).len(), members.len());
        assert_eq!(plan.executor(stage), StageExecutor::Concurrent);

        let mut expected = Vec::new();
        for (a, left) in members.iter().enumerate() {
            for (b, right) in members.iter().enumerate() {
                if a == b || left.resource != right.resource {
                    continue;
                }
                let read_after_write = !left.write && right.write;
                let write_after_write = left.write && right.write && b < a;
                if read_after_write || write_after_write {
                    expected.push((LocalIndex::new(a), LocalIndex::new(b)));
                }
            }
        }
        assert_eq!(plan.edges(stage), expected, "stage {stage}");
    }
}

#[test]
fn dependents_invert_dependencies() {
    let plan = build(&systems(&workload(40, 99)));
    for stage in STAGES {
        let nodes = plan.nodes(stage);
        for (i, node) in nodes.iter().enumerate() {
            for dep in plan.dependencies(node) {
                assert!(plan.dependents(&nodes[dep.get()]).contains(&LocalIndex::new(i)));
            }
            for dependent in plan.dependents(node) {
                assert!(plan.dependencies(&nodes[dependent.get()]).contains(&LocalIndex::new(i)));
            }
        }
    }
}

#[test]
fn rebuilding_yields_an_identical_plan() {
    let accesses = workload(50, 1234);
    let first = build(&systems(&accesses));
    let second = build(&systems(&accesses));

    assert_eq!(first.system_count(), second.system_count());
    for stage in Stage::ALL {
        assert_eq!(names(&first, stage), names(&second, stage));
        assert_eq!(first.edges(stage), second.edges(stage));
    }
}

#[test]
fn global_and_local_indices_refer_to_the_same_node() {
    let plan = build(&systems(&workload(30, 5)));
    for stage in STAGES {
        for (i, node) in plan.nodes(stage).iter().enumerate() {
            let global = plan.global_index(stage, LocalIndex::new(i));
            assert_eq!(plan.node(global).name(), node.name());
        }
    }
}

#[test]
fn order_overrides_registration_within_a_stage() {
    let systems: Vec<Arc<dyn System>> = [("last", 10), ("first", -10), ("middle", 0)]
        .into_iter()
        .map(|(name, order)| {
            SystemDescriptor::new(name, Stage::Update, |_: &FrameContext| {})
                .with_order(order)
                .with_access(|a| {
                    a.writes_named("shared");
                })
                .into_system()
        })
        .collect();
    let plan = build(&systems);

    assert_eq!(names(&plan, Stage::Update), ["first", "middle", "last"]);
    assert_eq!(
        plan.edges(Stage::Update),
        [
            (LocalIndex::new(1), LocalIndex::new(0)),
            (LocalIndex::new(2), LocalIndex::new(0)),
            (LocalIndex::new(2), LocalIndex::new(1)),
        ]
    );
}
