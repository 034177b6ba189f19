//! Worker pool sizing.

use super::{read_integer, ConfigError, ConfigLookup};

pub const POOL_THREADS_KEY: &str = "TILESEED_POOL_THREADS";
pub const POOL_QUEUE_CAPACITY_KEY: &str = "TILESEED_POOL_QUEUE_CAPACITY";

/// Thread count used when the host parallelism cannot be determined.
pub const FALLBACK_POOL_THREADS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Sizing of the shared worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub core_size: usize,
    /// Queued tasks accepted before submission blocks.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_POOL_THREADS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolConfig {
    pub fn new(core_size: usize, queue_capacity: usize) -> Self {
        Self {
            core_size,
            queue_capacity,
        }
    }

    /// Resolves pool sizing; both values must be at least 1.
    pub fn resolve(lookup: &dyn ConfigLookup) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            core_size: positive(POOL_THREADS_KEY, lookup, defaults.core_size)?,
            queue_capacity: positive(POOL_QUEUE_CAPACITY_KEY, lookup, defaults.queue_capacity)?,
        })
    }
}

fn positive(key: &str, lookup: &dyn ConfigLookup, default: usize) -> Result<usize, ConfigError> {
    let Some(value) = read_integer(lookup, key) else {
        return Ok(default);
    };
    if value < 1 {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(usize::try_from(value).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapLookup;

    #[test]
    fn test_default_has_workers() {
        let config = PoolConfig::default();
        assert!(config.core_size >= 1);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_resolve_overrides() {
        let lookup = MapLookup::new()
            .with(POOL_THREADS_KEY, "3")
            .with(POOL_QUEUE_CAPACITY_KEY, "16");
        assert_eq!(PoolConfig::resolve(&lookup).unwrap(), PoolConfig::new(3, 16));
    }

    #[test]
    fn test_resolve_rejects_zero_threads() {
        let lookup = MapLookup::new().with(POOL_THREADS_KEY, "0");
        assert!(matches!(
            PoolConfig::resolve(&lookup),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
