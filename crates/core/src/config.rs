use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scheduler configuration, typically parsed from TOML.
///
/// Environment variables override file values:
/// - `TICKWORK_WORKER_THREADS` → `worker_threads`
/// - `TICKWORK_QUEUE_CAPACITY` → `queue_capacity`
/// - `TICKWORK_IDLE_WAIT_MS` → `idle_wait_ms`
/// - `TICKWORK_INLINE_BUDGET_US` → `inline_budget_us`
/// - `TICKWORK_MAX_RESOURCES_PER_SYSTEM` → `max_resources_per_system`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism minus the scheduling thread.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Job ring capacity. Must be a power of two.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long an idle worker sleeps on the semaphore before rechecking shutdown.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
    /// Inline-checked systems running longer than this are reported.
    #[serde(default = "default_inline_budget_us")]
    pub inline_budget_us: u64,
    /// Cap on mutable and on read-only resource declarations per system.
    #[serde(default = "default_max_resources")]
    pub max_resources_per_system: usize,
}

fn default_worker_threads() -> usize { 0 }
fn default_queue_capacity() -> usize { 1024 }
fn default_idle_wait_ms() -> u64 { 10 }
fn default_inline_budget_us() -> u64 { 200 }
fn default_max_resources() -> usize { 64 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            queue_capacity: default_queue_capacity(),
            idle_wait_ms: default_idle_wait_ms(),
            inline_budget_us: default_inline_budget_us(),
            max_resources_per_system: default_max_resources(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, apply env overrides, validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus env overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve worker thread count (0 means available parallelism minus one, at least one).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(3)
        } else {
            self.worker_threads
        }
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn inline_budget(&self) -> Duration {
        Duration::from_micros(self.inline_budget_us)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("TICKWORK_WORKER_THREADS") {
            self.worker_threads = v;
        }
        if let Some(v) = env_parse("TICKWORK_QUEUE_CAPACITY") {
            self.queue_capacity = v;
        }
        if let Some(v) = env_parse("TICKWORK_IDLE_WAIT_MS") {
            self.idle_wait_ms = v;
        }
        if let Some(v) = env_parse("TICKWORK_INLINE_BUDGET_US") {
            self.inline_budget_us = v;
        }
        if let Some(v) = env_parse("TICKWORK_MAX_RESOURCES_PER_SYSTEM") {
            self.max_resources_per_system = v;
        }
    }

    /// Validate ranges that would otherwise surface as runtime faults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 || !self.queue_capacity.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity must be a nonzero power of two, got {}",
                self.queue_capacity
            )));
        }
        if self.queue_capacity > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity {} does not fit a job handle",
                self.queue_capacity
            )));
        }
        if self.idle_wait_ms == 0 {
            return Err(ConfigError::Invalid("idle_wait_ms must be at least 1".into()));
        }
        if self.max_resources_per_system == 0 {
            return Err(ConfigError::Invalid(
                "max_resources_per_system must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config:");
        tracing::info!("  workers:    {} (configured {})", self.resolved_worker_threads(), self.worker_threads);
        tracing::info!("  queue:      capacity={}", self.queue_capacity);
        tracing::info!("  idle wait:  {}ms", self.idle_wait_ms);
        tracing::info!("  inline:     budget={}us", self.inline_budget_us);
        tracing::info!("  resources:  max {} per system", self.max_resources_per_system);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}
