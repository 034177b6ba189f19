//! Configuration errors.

use thiserror::Error;

/// Errors raised while resolving configuration.
///
/// Any of these prevents the breeder from being built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A retry-control value was negative.
    #[error("Invalid configuration value for {key}: {value}. It should be a non-negative integer.")]
    Negative { key: String, value: i64 },

    /// A value was outside its accepted range.
    #[error("Invalid configuration value for {key}: {value} - {reason}")]
    OutOfRange {
        key: String,
        value: i64,
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] ini::Error),
}
