mod cli;
mod workload;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tickwork_core::{ResourceRegistry, SchedulerConfig};
use tickwork_schedule::Engine;

use crate::cli::CliArgs;
use crate::workload::WorkCounter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;

    let registry = Arc::new(ResourceRegistry::new());
    registry.insert(WorkCounter::default());
    let systems = workload::build(
        args.systems,
        args.resources,
        Duration::from_micros(args.work_us),
    );
    let mut engine =
        Engine::with_resources(config, registry, systems).context("failed to build engine")?;

    engine.startup();
    let started = Instant::now();
    for _ in 0..args.frames {
        engine.frame();
    }
    let elapsed = started.elapsed();
    let metrics = engine.metrics();
    engine.shutdown();

    let per_frame_us = if args.frames == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() * 1e6 / args.frames as f64
    };
    info!(
        frames = args.frames,
        systems = metrics.systems,
        edges = metrics.edges,
        dropped = metrics.dropped_edges,
        elapsed_ms = elapsed.as_millis() as u64,
        per_frame_us,
        jobs = metrics.queue.executed,
        rejected = metrics.queue.rejected,
        inline_overruns = metrics.inline_overruns,
        "Benchmark complete"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }
    Ok(())
}

fn load_config(path: Option<&str>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {path}")),
        None => SchedulerConfig::from_env().context("invalid scheduler configuration"),
    }
}
