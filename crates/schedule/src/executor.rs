//! Drives one stage of a [`Plan`] to completion.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use tickwork_core::{ExecutionMode, FrameContext, Stage};
use tickwork_jobs::{panic_message, JobHandle, JobQueue, JobState, Runnable};
use tracing::{error, trace, warn};

use crate::plan::{LocalIndex, Plan, StageExecutor, SystemNode};

/// Per-engine scratch reused across stage runs.
#[derive(Debug)]
pub(crate) struct StageRunner {
    remaining: Vec<usize>,
    ready: VecDeque<LocalIndex>,
    running: Vec<(LocalIndex, JobHandle)>,
    inline_budget: Duration,
    /// Longest sleep while joining on running jobs.
    idle_wait: Duration,
    /// Checked inline runs over budget during the current stage.
    overruns: u64,
}

impl StageRunner {
    pub(crate) fn new(inline_budget: Duration, idle_wait: Duration) -> Self {
        Self {
            remaining: Vec::new(),
            ready: VecDeque::new(),
            running: Vec::new(),
            inline_budget,
            idle_wait,
            overruns: 0,
        }
    }

    /// Run every system of `stage` exactly once; returns when all of them finished.
    ///
    /// Returns how many `InlineChecked` systems exceeded the inline budget.
    pub(crate) fn run(
        &mut self,
        plan: &Plan,
        stage: Stage,
        ctx: &FrameContext,
        jobs: &JobQueue,
    ) -> u64 {
        self.overruns = 0;
        let nodes = plan.nodes(stage);
        if nodes.is_empty() {
            return 0;
        }
        match plan.executor(stage) {
            StageExecutor::Sequential => {
                for node in nodes {
                    self.run_inline(node, ctx);
                }
            }
            StageExecutor::ReverseSequential => {
                for node in nodes.iter().rev() {
                    self.run_inline(node, ctx);
                }
            }
            StageExecutor::Concurrent => self.run_concurrent(plan, stage, ctx, jobs),
        }
        self.overruns
    }

    fn run_concurrent(&mut self, plan: &Plan, stage: Stage, ctx: &FrameContext, jobs: &JobQueue) {
        let nodes = plan.nodes(stage);

        self.remaining.clear();
        self.remaining
            .extend(nodes.iter().map(|node| node.dependency_count()));
        self.ready.clear();
        self.running.clear();
        for (i, remaining) in self.remaining.iter().enumerate() {
            if *remaining == 0 {
                self.ready.push_back(LocalIndex::new(i));
            }
        }

        let backoff = Backoff::new();
        let mut finished = 0;
        while finished < nodes.len() {
            // Read before polling so a completion racing the poll still wakes us.
            let seen = jobs.completions();
            let mut progressed = false;

            while let Some(local) = self.ready.pop_front() {
                let node = &nodes[local.get()];
                if node.mode().is_inline() {
                    self.run_inline(node, ctx);
                    self.release_dependents(plan, node);
                    finished += 1;
                    progressed = true;
                    continue;
                }

                let system = Arc::clone(node.system());
                let job_ctx = ctx.clone();
                let handle = jobs.enqueue(Runnable::new(move || system.run(&job_ctx)), false);
                if !handle.is_valid() && !jobs.is_running() {
                    warn!(stage = %stage, system = node.name(), "job queue stopped, running system inline");
                    self.run_inline(node, ctx);
                    self.release_dependents(plan, node);
                    finished += 1;
                    progressed = true;
                    continue;
                }
                if !handle.is_valid() {
                    // Queue is full. Retry once running jobs have drained a slot.
                    trace!(stage = %stage, system = node.name(), "job queue full, deferring");
                    self.ready.push_front(local);
                    break;
                }
                self.running.push((local, handle));
                progressed = true;
            }

            let mut i = 0;
            while i < self.running.len() {
                let (local, mut handle) = self.running[i];
                if !jobs.is_completed(handle) {
                    i += 1;
                    continue;
                }
                let node = &nodes[local.get()];
                if jobs.state(handle) == JobState::Error {
                    error!(stage = %stage, system = node.name(), "system job failed");
                }
                jobs.reset(&mut handle);
                self.running.swap_remove(i);
                self.release_dependents(plan, node);
                finished += 1;
                progressed = true;
            }

            if progressed {
                backoff.reset();
            } else if backoff.is_completed() {
                jobs.wait_for_completion(seen, self.idle_wait);
            } else {
                backoff.snooze();
            }
        }
    }

    fn release_dependents(&mut self, plan: &Plan, node: &SystemNode) {
        for dependent in plan.dependents(node) {
            let remaining = &mut self.remaining[dependent.get()];
            *remaining -= 1;
            if *remaining == 0 {
                self.ready.push_back(*dependent);
            }
        }
    }

    /// Run a node on the calling thread.
    ///
    /// A panic is contained in debug builds so the stage still drains its jobs;
    /// release builds abort, as the worker pool does.
    fn run_inline(&mut self, node: &SystemNode, ctx: &FrameContext) {
        let started = Instant::now();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| node.system().run(ctx))) {
            let message = panic_message(payload.as_ref());
            if cfg!(debug_assertions) {
                error!(system = node.name(), stage = %ctx.stage(), %message, "inline system panicked");
            } else {
                error!(system = node.name(), stage = %ctx.stage(), %message, "inline system panicked, aborting");
                std::process::abort();
            }
        }
        if node.mode() != ExecutionMode::InlineChecked {
            return;
        }
        let elapsed = started.elapsed();
        if elapsed > self.inline_budget {
            self.overruns += 1;
            warn!(
                system = node.name(),
                stage = %ctx.stage(),
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.inline_budget.as_micros() as u64,
                "Inline system exceeded its time budget"
            );
        }
    }
}
