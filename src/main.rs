//! Command-line front-end: loads the architecture and workload files, wires
//! the chosen strategies together, runs the simulation, and prints the
//! report on stdout. Diagnostics go to stderr.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use schedsim::config::{Architecture, Kernel, OptimizeMode, ProcessPolicy, SchedPolicy, SimConfig};
use schedsim::error::SimError;
use schedsim::simulator::Simulator;
use schedsim::workload::Workload;

#[derive(Parser, Debug)]
#[command(
    name = "schedsim",
    about = "Multicore task-scheduling simulator with paging and private L1 caches"
)]
struct Args {
    /// Architecture file: core count, then `capacity sets ways blocks` per core.
    #[arg(long)]
    arch: PathBuf,

    /// Workload file: task count, then `real_id work arrival addrs…` per task.
    #[arg(long)]
    input: PathBuf,

    /// Work-rescaling kernel applied before simulation.
    #[arg(long, value_enum)]
    kernel: Kernel,

    /// Use at most this many cores of the architecture file.
    #[arg(long)]
    ncores: Option<usize>,

    /// Core processing strategy.
    #[arg(long, value_enum)]
    process: ProcessPolicy,

    /// Minimum number of admitted tasks per scheduling round.
    #[arg(long, default_value_t = 1)]
    batchsize: usize,

    /// Memory-reference window size for the locality groupers.
    #[arg(long, default_value_t = 64)]
    winsize: usize,

    /// Seed for the simulation's single pseudo-random stream.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Queue optimization: 0 none, 1 k-means, 2 round-robin fill, 3 Q-learning.
    #[arg(long, default_value_t = 0)]
    optimize: u8,

    /// Scheduling policy.
    #[arg(value_enum)]
    scheduler: SchedPolicy,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = SimConfig {
        batchsize: args.batchsize,
        winsize: args.winsize,
        seed: args.seed,
        optimize: OptimizeMode::from_flag(args.optimize)?,
    };
    config.validate()?;

    let arch_file = File::open(&args.arch)
        .map_err(|e| SimError::io(args.arch.display().to_string(), e))?;
    let arch = Architecture::from_text(arch_file)?;
    let specs = arch.select(args.ncores);

    let input_file = File::open(&args.input)
        .map_err(|e| SimError::io(args.input.display().to_string(), e))?;
    let mut workload = Workload::from_text(input_file, specs.len())?;
    workload.apply_kernel(|w| args.kernel.apply(w));

    tracing::info!(
        ncores = specs.len(),
        ntasks = workload.ntasks(),
        scheduler = ?args.scheduler,
        process = ?args.process,
        "starting simulation"
    );

    let state_dir = std::env::current_dir()
        .map_err(|e| SimError::io("current directory".to_string(), e))?;
    let mut sim = Simulator::new(
        workload,
        specs,
        args.scheduler,
        args.process,
        &config,
        &state_dir,
    );
    let report = sim.run();
    print!("{report}");
    Ok(())
}
