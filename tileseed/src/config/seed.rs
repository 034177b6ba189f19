//! Seed retry control.

use std::time::Duration;

use super::{read_integer, ConfigError, ConfigLookup};

pub const RETRY_COUNT_KEY: &str = "TILESEED_RETRY_COUNT";
pub const RETRY_WAIT_KEY: &str = "TILESEED_RETRY_WAIT";
pub const ABORT_LIMIT_KEY: &str = "TILESEED_ABORT_LIMIT";

pub const DEFAULT_RETRY_COUNT: u32 = 0;
pub const DEFAULT_RETRY_WAIT_MS: u64 = 100;
pub const DEFAULT_ABORT_LIMIT: u64 = 1000;

/// Retry policy applied by every seed task of a breeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedConfig {
    /// Retries after a failed tile. Zero makes any failure fatal to the task.
    pub tile_failure_retry_count: u32,
    /// Pause before each retry.
    pub tile_failure_retry_wait: Duration,
    /// Failures shared by one job before its tasks abort.
    pub total_failures_before_aborting: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            tile_failure_retry_count: DEFAULT_RETRY_COUNT,
            tile_failure_retry_wait: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
            total_failures_before_aborting: DEFAULT_ABORT_LIMIT,
        }
    }
}

impl SeedConfig {
    /// Resolves the retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Negative`] for any negative value.
    pub fn resolve(lookup: &dyn ConfigLookup) -> Result<Self, ConfigError> {
        let retry_count = non_negative(
            RETRY_COUNT_KEY,
            read_integer(lookup, RETRY_COUNT_KEY).unwrap_or(i64::from(DEFAULT_RETRY_COUNT)),
        )?;
        let retry_wait = non_negative(
            RETRY_WAIT_KEY,
            read_integer(lookup, RETRY_WAIT_KEY).unwrap_or(DEFAULT_RETRY_WAIT_MS as i64),
        )?;
        let abort_limit = non_negative(
            ABORT_LIMIT_KEY,
            read_integer(lookup, ABORT_LIMIT_KEY).unwrap_or(DEFAULT_ABORT_LIMIT as i64),
        )?;

        let config = Self {
            tile_failure_retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            tile_failure_retry_wait: Duration::from_millis(retry_wait),
            total_failures_before_aborting: abort_limit,
        };
        tracing::debug!(
            retry_count = config.tile_failure_retry_count,
            retry_wait_ms = retry_wait,
            abort_limit = config.total_failures_before_aborting,
            "Resolved seed retry configuration"
        );
        Ok(config)
    }
}

fn non_negative(key: &str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Negative {
        key: key.to_string(),
        value,
    })
}
