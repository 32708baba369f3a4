//! Synthetic systems for benchmarking the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tickwork_core::{ExecutionMode, FrameContext, Stage, System, SystemDescriptor};
use tracing::info;

/// Shared tally of system invocations, stored in the resource registry.
#[derive(Debug, Default)]
pub struct WorkCounter(AtomicU64);

impl WorkCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Build `systems` frame systems over `resources` named resources, plus one
/// bootstrap and one teardown system.
///
/// System `i` writes resource `i % resources` and reads the resource after it,
/// so neighbours in the same stage contend and form short dependency chains.
/// Every fifth system runs inline with a budget check.
pub fn build(systems: usize, resources: usize, work: Duration) -> Vec<Arc<dyn System>> {
    let resources = resources.max(1);
    let mut out: Vec<Arc<dyn System>> = Vec::with_capacity(systems + 2);

    out.push(
        SystemDescriptor::new("bench-startup", Stage::Startup, |ctx: &FrameContext| {
            info!(resources = ctx.resources().len(), "Workload starting");
        })
        .into_system(),
    );

    for i in 0..systems {
        let stage = Stage::FRAME[i % Stage::FRAME.len()];
        let writes = format!("res-{}", i % resources);
        let reads = format!("res-{}", (i + 1) % resources);
        let mode = if i % 5 == 0 {
            ExecutionMode::InlineChecked
        } else {
            ExecutionMode::Job
        };
        out.push(
            SystemDescriptor::new(format!("bench-{i}"), stage, move |ctx: &FrameContext| {
                spin(work);
                if let Some(counter) = ctx.resource::<WorkCounter>() {
                    counter.0.fetch_add(1, Ordering::Relaxed);
                }
            })
            .with_mode(mode)
            .with_access(move |a| {
                a.writes_named(&writes);
                a.reads_named(&reads);
                a.reads::<WorkCounter>();
            })
            .into_system(),
        );
    }

    out.push(
        SystemDescriptor::new("bench-teardown", Stage::EndOfLife, |ctx: &FrameContext| {
            let total = ctx.resource::<WorkCounter>().map(|c| c.get()).unwrap_or_default();
            info!(invocations = total, frame = ctx.frame(), "Workload finished");
        })
        .into_system(),
    );
    out
}

fn spin(work: Duration) {
    let started = Instant::now();
    while started.elapsed() < work {
        std::hint::spin_loop();
    }
}
