use clap::Parser;

/// Synthetic workload driver for the tickwork engine.
///
/// Registers a layered set of systems with overlapping resource access, runs
/// startup, the requested number of frames and shutdown, then reports timings.
#[derive(Parser, Debug)]
#[command(name = "tickwork-bench", version, about)]
pub struct CliArgs {
    /// Path to a scheduler TOML file (environment overrides still apply)
    #[arg(long, env = "TICKWORK_CONFIG")]
    pub config: Option<String>,

    /// Frames to run
    #[arg(long, default_value_t = 1000)]
    pub frames: u64,

    /// Synthetic systems to register
    #[arg(long, default_value_t = 64)]
    pub systems: usize,

    /// Distinct resources the systems contend for
    #[arg(long, default_value_t = 8)]
    pub resources: usize,

    /// Busy-work per system invocation, in microseconds
    #[arg(long, default_value_t = 20)]
    pub work_us: u64,

    /// Print the final metrics snapshot as JSON
    #[arg(long)]
    pub json: bool,
}
