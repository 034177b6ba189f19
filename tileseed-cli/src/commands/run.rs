//! `tileseed run`: create and dispatch one job against an in-memory layer,
//! then report its progress until it finishes.
//!
//! Ctrl-C requests cooperative termination of the job; the command exits
//! once every task has stopped.

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tileseed::config::BreederConfig;
use tileseed::grid::{MetaTiling, ZoomBounds};
use tileseed::layer::{MemoryLayer, MemoryLayerDispatcher, MemoryStorage};
use tileseed::logging::{default_log_dir, default_log_file, init_logging, Console};
use tileseed::seed::{Job, SeedRequest, TaskState, TaskType, TileBreeder};

use super::common::config_lookup;
use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobType {
    /// Render tiles missing from the cache
    Seed,
    /// Render every tile, replacing cached ones
    Reseed,
    /// Delete cached tiles
    Truncate,
}

impl From<JobType> for TaskType {
    fn from(job_type: JobType) -> Self {
        match job_type {
            JobType::Seed => TaskType::Seed,
            JobType::Reseed => TaskType::Reseed,
            JobType::Truncate => TaskType::Truncate,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Layer name
    #[arg(long)]
    pub layer: String,

    /// First zoom level
    #[arg(long, default_value = "0")]
    pub zoom_start: u8,

    /// Last zoom level (inclusive)
    #[arg(long, default_value = "0")]
    pub zoom_stop: u8,

    /// Tile bounds at the first zoom level: minx,miny,maxx,maxy
    #[arg(long, value_parser = parse_bounds, default_value = "0,0,0,0")]
    pub bounds: ZoomBounds,

    /// Operation to perform
    #[arg(long = "type", value_enum, default_value = "seed")]
    pub job_type: JobType,

    /// Tasks to run in parallel (truncate always uses one)
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    pub threads: i64,

    /// Refresh the layer's request filters after success
    #[arg(long)]
    pub filter_update: bool,

    /// INI file with [seed] and [pool] sections
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Milliseconds between status reports
    #[arg(long, default_value = "1000")]
    pub status_interval_ms: u64,

    /// Meta-tiling factor of the demo layer, in both directions
    #[arg(long, default_value = "1")]
    pub meta_tiling: u32,

    /// Simulated render time per meta-tile, in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Print status reports as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parses `minx,miny,maxx,maxy`.
pub fn parse_bounds(s: &str) -> Result<ZoomBounds, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid bound '{}': {}", s, e))?;
    match values.as_slice() {
        [min_x, min_y, max_x, max_y] if min_x <= max_x && min_y <= max_y => {
            Ok(ZoomBounds::new(*min_x, *min_y, *max_x, *max_y))
        }
        [_, _, _, _] => Err(format!("bounds '{}' have min greater than max", s)),
        _ => Err(format!(
            "expected 4 comma-separated values, got {}",
            values.len()
        )),
    }
}

pub fn run(args: RunArgs) -> Result<(), CliError> {
    let console = if args.json {
        Console::Stderr
    } else {
        Console::Stdout
    };
    let _logging = init_logging(default_log_dir(), default_log_file(), console)
        .map_err(CliError::LoggingInit)?;

    let lookup = config_lookup(args.config.as_deref())?;
    let config = BreederConfig::resolve(&lookup)?;

    let storage = Arc::new(MemoryStorage::new());
    let layer = MemoryLayer::new(
        args.layer.clone(),
        MetaTiling::new(args.meta_tiling, args.meta_tiling),
        Arc::clone(&storage),
    )
    .with_latency(Duration::from_millis(args.latency_ms));
    let dispatcher = Arc::new(MemoryLayerDispatcher::new());
    dispatcher.add(Arc::new(layer));

    let breeder = TileBreeder::new(config, dispatcher, storage)?;
    let request = SeedRequest::new(args.layer.clone(), args.job_type.into())
        .with_zooms(args.zoom_start, args.zoom_stop)
        .with_bounds(args.bounds)
        .with_threads(args.threads)
        .with_filter_update(args.filter_update);
    let job = breeder.seed(&request)?;

    if !args.json {
        println!(
            "Job {}: {} '{}' zoom {}-{}, {} tiles, {} task(s)",
            job.id(),
            job.task_type(),
            args.layer,
            args.zoom_start,
            args.zoom_stop,
            job.range().tile_count(),
            job.thread_count()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let interval = Duration::from_millis(args.status_interval_ms.max(1));
    let state = runtime.block_on(watch(&breeder, &job, interval, args.json))?;

    breeder.shutdown();

    if state == TaskState::Dead {
        return Err(CliError::JobFailed {
            job_id: job.id(),
            state,
            reasons: job.tasks().iter().filter_map(|t| t.failure()).collect(),
        });
    }
    if !args.json {
        let tiles: u64 = job.tasks().iter().map(|t| t.tiles_done()).sum();
        println!("Job {} finished: {} tiles", job.id(), tiles);
    }
    Ok(())
}

/// Reports status every `interval` until the job stops.
async fn watch(
    breeder: &TileBreeder,
    job: &Arc<Job>,
    interval: Duration,
    json: bool,
) -> Result<TaskState, CliError> {
    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report(job, json)?;
                breeder.drain();
                if is_finished(job) {
                    return Ok(job.state());
                }
            }
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    continue;
                }
                tracing::info!(job_id = job.id(), "Interrupted, terminating job");
                job.terminate();
            }
        }
    }
}

fn is_finished(job: &Job) -> bool {
    job.state() == TaskState::Dead || job.tasks().iter().all(|t| t.state().is_terminal())
}

fn report(job: &Job, json: bool) -> Result<(), CliError> {
    let status = job.status();
    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    println!(
        "[{}] job {} {}",
        status.timestamp.format("%H:%M:%S"),
        status.job_id,
        status.state
    );
    for task in &status.tasks {
        let id = task
            .task_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let eta = match task.time_remaining {
            t if t < 0 => "?".to_string(),
            t => format!("{}s", t),
        };
        println!(
            "  task {:>4}  {:<8} {:>8}/{:<8} eta {}",
            id, task.state, task.tiles_done, task.tiles_total, eta
        );
    }
    Ok(())
}
