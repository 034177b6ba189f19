//! tileseed - job and task scheduling for tile cache seeding.
//!
//! A [`TileBreeder`](seed::TileBreeder) turns requests to seed, reseed or
//! truncate a range of map tiles into jobs, runs each job's tasks on a
//! bounded worker pool, and answers status and termination requests while
//! they run.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tileseed::config::{BreederConfig, EnvLookup};
//! use tileseed::seed::{SeedRequest, TaskType, TileBreeder};
//!
//! let config = BreederConfig::resolve(&EnvLookup)?;
//! let breeder = TileBreeder::new(config, layers, storage)?;
//!
//! let job = breeder.seed(&SeedRequest::new("roads", TaskType::Seed).with_zooms(0, 8))?;
//! for status in breeder.task_status_list(Some("roads")) {
//!     println!("{:?}", status.as_tuple());
//! }
//! job.terminate();
//! ```
//!
//! Layers and storage are collaborators behind the traits in [`layer`].

pub mod config;
pub mod grid;
pub mod layer;
pub mod logging;
pub mod seed;

/// Version of the tileseed library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
