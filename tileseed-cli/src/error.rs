//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and a non-zero exit code.

use std::fmt;
use std::process;
use tileseed::config::ConfigError;
use tileseed::seed::{SeedError, TaskState};

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Invalid configuration
    Config(ConfigError),
    /// Scheduler rejected the request
    Seed(SeedError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to encode status output
    Output(serde_json::Error),
    /// The job finished without completing
    JobFailed {
        job_id: u64,
        state: TaskState,
        reasons: Vec<String>,
    },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigError::Negative { key, .. }) => {
                eprintln!();
                eprintln!("Unset {} or give it a value of 0 or more.", key);
            }
            CliError::JobFailed { reasons, .. } if !reasons.is_empty() => {
                eprintln!();
                eprintln!("Task failures:");
                for reason in reasons {
                    eprintln!("  - {}", reason);
                }
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Seed(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Output(e) => write!(f, "Failed to encode status: {}", e),
            CliError::JobFailed { job_id, state, .. } => {
                write!(f, "Job {} finished in state {}", job_id, state)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) | CliError::Runtime(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Seed(e) => Some(e),
            CliError::Output(e) => Some(e),
            CliError::JobFailed { .. } => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<SeedError> for CliError {
    fn from(e: SeedError) -> Self {
        CliError::Seed(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
