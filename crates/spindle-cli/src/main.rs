//! Demo runner for spindle-core.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Deserialize;
use spindle_core::{PeriodicWorker, PoolConfig, ThreadPool, WorkerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// spindle: periodic workers and a reaper-joined thread pool.
#[derive(Parser)]
#[command(name = "spindle", version, about)]
struct Cli {
    /// Path to a JSON config file (`{ "pool": {...}, "worker": {...} }`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Submit threads with random durations and show they are joined in order.
    Pool {
        #[arg(short, long, default_value_t = 8)]
        threads: usize,
    },

    /// Run a counting worker for a while, then halt it.
    Worker {
        #[arg(long, default_value_t = 10)]
        hz: u32,

        #[arg(long, default_value_t = 1000)]
        run_ms: u64,
    },

    /// Both at once: a worker reporting pool stats while threads come and go.
    Demo {
        #[arg(short, long, default_value_t = 8)]
        threads: usize,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    pool: PoolConfig,
    worker: WorkerConfig,
}

impl FileConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.pool.validate()?;
        config.worker.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match cli.command.unwrap_or(Command::Demo { threads: 8 }) {
        Command::Pool { threads } => run_pool(config.pool, threads),
        Command::Worker { hz, run_ms } => {
            run_worker(config.worker.with_frequency(hz), Duration::from_millis(run_ms))
        }
        Command::Demo { threads } => run_demo(config, threads),
    }
}

/// Submits threads whose sleep times are random, so they finish out of order.
fn submit_sleepers(pool: &ThreadPool, threads: usize) -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..threads {
        let ms: u64 = rng.gen_range(10..300);
        let id = pool.submit(move || thread::sleep(Duration::from_millis(ms)))?;
        info!(%id, sleep_ms = ms, "submitted");
    }
    Ok(())
}

fn run_pool(config: PoolConfig, threads: usize) -> anyhow::Result<()> {
    let pool = ThreadPool::with_config(config)?;
    submit_sleepers(&pool, threads)?;

    let wait = pool.config().drain_grace();
    if !pool.join(wait) {
        anyhow::bail!("threads still running after {wait:?}");
    }

    println!("{}", serde_json::to_string_pretty(&pool.recent_reaps())?);
    println!("stats: {}", serde_json::to_string(&pool.stats())?);
    pool.shutdown()?;
    Ok(())
}

fn run_worker(config: WorkerConfig, run_for: Duration) -> anyhow::Result<()> {
    let mut worker = PeriodicWorker::new(|| info!("tick"), config)?;
    worker.start()?;
    thread::sleep(run_for);
    worker.halt(Some(Duration::from_millis(500)))?;
    println!("ticks: {}", worker.ticks());
    Ok(())
}

fn run_demo(config: FileConfig, threads: usize) -> anyhow::Result<()> {
    let pool = Arc::new(ThreadPool::with_config(config.pool)?);

    let observed = Arc::clone(&pool);
    let mut reporter = PeriodicWorker::new(
        move || {
            let stats = observed.stats();
            info!(
                pending = stats.pending,
                joined = stats.joined,
                submitted = stats.submitted,
                "pool status"
            );
        },
        config.worker.with_frequency(5),
    )?;
    reporter.start()?;

    submit_sleepers(&pool, threads)?;
    let drained = pool.join(pool.config().drain_grace());
    reporter.halt(Some(Duration::from_millis(500)))?;
    if !drained {
        anyhow::bail!("threads still running after drain grace");
    }

    // The reporter held the other reference; it is dropped with the worker.
    drop(reporter);
    match Arc::try_unwrap(pool) {
        Ok(pool) => pool.shutdown()?,
        Err(_) => anyhow::bail!("pool still shared at shutdown"),
    }
    Ok(())
}
