use std::sync::Arc;
use std::time::Instant;

use tickwork_core::{FrameContext, ResourceRegistry, SchedulerConfig, Stage, System};
use tickwork_jobs::JobQueue;
use tracing::{debug, info, warn};

use crate::builder::PlanBuilder;
use crate::error::EngineError;
use crate::executor::StageRunner;
use crate::metrics::SchedulerMetrics;
use crate::plan::Plan;

/// Owns the job queue, the resource registry and the compiled plan, and drives
/// stages on the calling thread.
///
/// Stage runs block until every system of the stage has finished, so all effects
/// of one stage are visible to the next. After [`shutdown`](Self::shutdown) the
/// engine is inert: stage runs are skipped with a warning.
pub struct Engine {
    config: SchedulerConfig,
    plan: Plan,
    jobs: Arc<JobQueue>,
    resources: Arc<ResourceRegistry>,
    runner: StageRunner,
    frame: u64,
    metrics: SchedulerMetrics,
    stopped: bool,
}

impl Engine {
    /// Start the job queue and compile `systems` against a fresh registry.
    pub fn build(
        config: SchedulerConfig,
        systems: Vec<Arc<dyn System>>,
    ) -> Result<Self, EngineError> {
        Self::with_resources(config, Arc::new(ResourceRegistry::new()), systems)
    }

    /// Like [`build`](Self::build), resolving resources through an existing registry.
    pub fn with_resources(
        config: SchedulerConfig,
        resources: Arc<ResourceRegistry>,
        systems: Vec<Arc<dyn System>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        config.log_summary();

        let plan = PlanBuilder::from_config(&config).build(&systems, &resources)?;
        plan.log_summary();
        let jobs = Arc::new(JobQueue::from_config(&config)?);

        let metrics = SchedulerMetrics {
            systems: plan.system_count(),
            edges: plan.edge_count(),
            dropped_edges: plan.dropped_edges().len(),
            ..SchedulerMetrics::default()
        };
        info!(
            systems = metrics.systems,
            edges = metrics.edges,
            dropped = metrics.dropped_edges,
            "Engine ready"
        );

        Ok(Self {
            runner: StageRunner::new(config.inline_budget(), config.idle_wait()),
            config,
            plan,
            jobs,
            resources,
            frame: 0,
            metrics,
            stopped: false,
        })
    }

    /// Run every system of one stage and wait for all of them.
    pub fn run_stage(&mut self, stage: Stage) {
        if self.stopped {
            warn!(stage = %stage, "engine is shut down, skipping stage");
            return;
        }
        self.run_stage_unchecked(stage);
    }

    fn run_stage_unchecked(&mut self, stage: Stage) {
        let started = Instant::now();
        let ctx = FrameContext::new(self.frame, stage, Arc::clone(&self.resources));
        let overruns = self.runner.run(&self.plan, stage, &ctx, &self.jobs);
        let elapsed = started.elapsed();
        self.metrics.record_stage(stage, elapsed);
        self.metrics.inline_overruns += overruns;
        debug!(stage = %stage, frame = self.frame, elapsed_us = elapsed.as_micros() as u64, "stage complete");
    }

    /// Run the bootstrap stages once.
    pub fn startup(&mut self) {
        if self.stopped {
            warn!("engine is shut down, skipping startup");
            return;
        }
        info!("Running startup stages");
        for stage in Stage::STARTUP {
            self.run_stage_unchecked(stage);
        }
    }

    /// Run one frame: every per-frame stage in order.
    pub fn frame(&mut self) {
        if self.stopped {
            warn!(frame = self.frame, "engine is shut down, skipping frame");
            return;
        }
        let started = Instant::now();
        for stage in Stage::FRAME {
            self.run_stage_unchecked(stage);
        }
        self.frame += 1;
        self.metrics.record_frame(started.elapsed());
    }

    /// Run the teardown stages once, then stop the job queue. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.stopped {
            debug!("engine already shut down");
            return;
        }
        info!(frames = self.frame, "Running shutdown stages");
        for stage in Stage::SHUTDOWN {
            self.run_stage_unchecked(stage);
        }
        self.stopped = true;
        self.jobs.shutdown();
    }

    /// False once [`shutdown`](Self::shutdown) has run.
    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Shared job queue, for ad-hoc jobs submitted by systems or callers.
    pub fn jobs(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Frames completed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Snapshot of the current metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            queue: self.jobs.stats(),
            ..self.metrics.clone()
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("frame", &self.frame)
            .field("stopped", &self.stopped)
            .field("systems", &self.plan.system_count())
            .field("jobs", &self.jobs)
            .finish()
    }
}
