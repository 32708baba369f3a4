use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tickwork_core::Stage;
use tickwork_jobs::QueueStats;

/// Engine operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Frames completed since the engine was built.
    pub frames_run: u64,
    /// Times each stage was run.
    pub stage_runs: HashMap<Stage, u64>,
    /// Average wall time of each stage.
    pub avg_stage_duration: HashMap<Stage, Duration>,
    /// Wall time of the most recent frame.
    pub last_frame_duration: Option<Duration>,
    /// When the most recent frame finished.
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Systems in the plan.
    pub systems: usize,
    /// Dependency edges in the plan.
    pub edges: usize,
    /// Edges dropped to break cycles.
    pub dropped_edges: usize,
    /// `InlineChecked` runs that exceeded the inline budget.
    pub inline_overruns: u64,
    /// Job queue counters at snapshot time.
    pub queue: QueueStats,
}

impl SchedulerMetrics {
    /// Record one run of a stage.
    pub fn record_stage(&mut self, stage: Stage, duration: Duration) {
        let count = {
            let runs = self.stage_runs.entry(stage).or_default();
            *runs += 1;
            *runs
        };
        let prev_avg = self
            .avg_stage_duration
            .get(&stage)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_stage_duration.insert(stage, new_avg);
    }

    /// Record a completed frame.
    pub fn record_frame(&mut self, duration: Duration) {
        self.frames_run += 1;
        self.last_frame_duration = Some(duration);
        self.last_frame_at = Some(Utc::now());
    }
}
