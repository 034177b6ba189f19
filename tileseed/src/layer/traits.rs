//! Collaborator traits consumed by seed and truncate tasks.

use std::sync::Arc;
use thiserror::Error;

use crate::grid::{MetaTiling, TileRange, TileRequest};

/// Failure of a single layer operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LayerError {
    /// Human-readable error message.
    pub message: String,
    /// Whether a later attempt may succeed.
    pub is_retryable: bool,
}

impl LayerError {
    /// Creates a retryable error (backend timeout, transient I/O failure).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }
}

/// Failure of a storage operation.
#[derive(Debug, Clone, Error)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

/// A cached layer that can render tiles on demand.
pub trait TileLayer: Send + Sync + 'static {
    /// Layer name used for lookups and status filtering.
    fn name(&self) -> &str;

    /// Meta-tiling factors; seeding hands out one meta-tile per draw.
    fn meta_tiling(&self) -> MetaTiling;

    /// Renders the meta-tile at `request` into the cache.
    ///
    /// With `try_cache` set, tiles already present in the cache are left
    /// alone (seed). Without it they are always re-rendered (reseed).
    fn seed_tile(&self, request: &TileRequest, try_cache: bool) -> Result<(), LayerError>;

    /// Refreshes request filters after `range` has been modified.
    fn update_request_filters(&self, _range: &TileRange) -> Result<(), LayerError> {
        Ok(())
    }
}

/// Tile storage backend.
pub trait StorageBroker: Send + Sync + 'static {
    /// Deletes every stored tile inside `range`, returning how many were removed.
    fn delete_range(&self, range: &TileRange) -> Result<u64, StorageError>;
}

/// Resolves layers by name.
pub trait LayerDispatcher: Send + Sync + 'static {
    fn layer(&self, name: &str) -> Option<Arc<dyn TileLayer>>;

    fn layers(&self) -> Vec<Arc<dyn TileLayer>>;
}
