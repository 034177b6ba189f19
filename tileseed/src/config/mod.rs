//! Scheduler configuration.
//!
//! Configuration is resolved exactly once, when the breeder is built. Values
//! come from a [`ConfigLookup`], which may chain several sources:
//!
//! ```text
//! ChainedLookup ──► MapLookup   (explicit overrides)
//!               ──► IniLookup   ([seed] / [pool] sections of a config file)
//!               ──► EnvLookup   (process environment)
//! ```
//!
//! Seed retry control:
//!
//! | Key                    | Meaning                                   | Default |
//! |------------------------|-------------------------------------------|---------|
//! | `TILESEED_RETRY_COUNT` | retries per failed tile, 0 = no retries   | 0       |
//! | `TILESEED_RETRY_WAIT`  | wait before each retry, milliseconds      | 100     |
//! | `TILESEED_ABORT_LIMIT` | failures shared by a job before aborting  | 1000    |
//!
//! Worker pool: `TILESEED_POOL_THREADS` (default: available cores) and
//! `TILESEED_POOL_QUEUE_CAPACITY` (default 1024).

mod error;
mod lookup;
mod pool;
mod seed;

pub use error::ConfigError;
pub use lookup::{ChainedLookup, ConfigLookup, EnvLookup, IniLookup, MapLookup};
pub use pool::{
    PoolConfig, DEFAULT_QUEUE_CAPACITY, FALLBACK_POOL_THREADS, POOL_QUEUE_CAPACITY_KEY,
    POOL_THREADS_KEY,
};
pub use seed::{
    SeedConfig, ABORT_LIMIT_KEY, DEFAULT_ABORT_LIMIT, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_WAIT_MS,
    RETRY_COUNT_KEY, RETRY_WAIT_KEY,
};

/// Everything the breeder needs at construction time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreederConfig {
    pub seed: SeedConfig,
    pub pool: PoolConfig,
}

impl BreederConfig {
    /// Resolves all scheduler settings from `lookup`.
    ///
    /// # Errors
    ///
    /// Fails on any negative retry value or an unusable pool size.
    pub fn resolve(lookup: &dyn ConfigLookup) -> Result<Self, ConfigError> {
        Ok(Self {
            seed: SeedConfig::resolve(lookup)?,
            pool: PoolConfig::resolve(lookup)?,
        })
    }
}

/// Reads `key` as an integer.
///
/// Absent keys yield `None`. Values that do not parse are logged and also
/// yield `None`, so the caller's default applies.
pub(crate) fn read_integer(lookup: &dyn ConfigLookup, key: &str) -> Option<i64> {
    let raw = lookup.lookup(key)?;
    match raw.trim().parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid integer configuration value, using default");
            None
        }
    }
}
