//! `tileseed config`: print the resolved scheduler configuration.

use clap::Args;
use std::path::PathBuf;
use tileseed::config::{
    BreederConfig, ABORT_LIMIT_KEY, POOL_QUEUE_CAPACITY_KEY, POOL_THREADS_KEY, RETRY_COUNT_KEY,
    RETRY_WAIT_KEY,
};

use super::common::config_lookup;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// INI file with [seed] and [pool] sections
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: ConfigArgs) -> Result<(), CliError> {
    let lookup = config_lookup(args.config.as_deref())?;
    let config = BreederConfig::resolve(&lookup)?;

    println!("Seed retry control");
    println!(
        "  retry_count     {:<8} ({})",
        config.seed.tile_failure_retry_count, RETRY_COUNT_KEY
    );
    println!(
        "  retry_wait      {:<8} ({}, milliseconds)",
        config.seed.tile_failure_retry_wait.as_millis(),
        RETRY_WAIT_KEY
    );
    println!(
        "  abort_limit     {:<8} ({})",
        config.seed.total_failures_before_aborting, ABORT_LIMIT_KEY
    );
    println!();
    println!("Worker pool");
    println!(
        "  threads         {:<8} ({})",
        config.pool.core_size, POOL_THREADS_KEY
    );
    println!(
        "  queue_capacity  {:<8} ({})",
        config.pool.queue_capacity, POOL_QUEUE_CAPACITY_KEY
    );
    Ok(())
}
