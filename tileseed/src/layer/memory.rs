//! In-memory layer, storage and dispatcher.
//!
//! [`MemoryStorage`] holds the cached meta-tiles, keyed by their lower-left tile.
//! [`MemoryLayer`] "renders" into it, optionally with injected latency or
//! failures, and counts every call so tests can assert on behaviour.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::traits::{LayerDispatcher, LayerError, StorageBroker, StorageError, TileLayer};
use crate::grid::{GridLocation, MetaTiling, TileRange, TileRequest};

// =============================================================================
// Storage
// =============================================================================

/// Cached meta-tiles and their meta-tiling factors.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tiles: Mutex<HashMap<GridLocation, MetaTiling>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a single tile.
    pub fn insert(&self, loc: GridLocation) {
        self.insert_meta_tile(loc, MetaTiling::default());
    }

    /// Stores the meta-tile anchored at `loc`.
    pub fn insert_meta_tile(&self, loc: GridLocation, meta: MetaTiling) {
        self.tiles.lock().insert(loc, meta);
    }

    pub fn contains(&self, loc: &GridLocation) -> bool {
        self.tiles.lock().contains_key(loc)
    }

    /// Number of stored meta-tiles.
    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    /// Number of tiles covered by the stored meta-tiles.
    pub fn tile_count(&self) -> u64 {
        self.tiles
            .lock()
            .values()
            .map(MetaTiling::tiles_per_meta_tile)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}

impl StorageBroker for MemoryStorage {
    /// Drops every meta-tile anchored inside `range` and returns the number
    /// of its tiles that lie inside the range.
    fn delete_range(&self, range: &TileRange) -> Result<u64, StorageError> {
        let mut deleted = 0u64;
        self.tiles.lock().retain(|loc, meta| {
            let Some(bounds) = range.bounds_at(loc.zoom) else {
                return true;
            };
            let covered =
                bounds.clipped_block(loc.x, loc.y, u64::from(meta.x), u64::from(meta.y));
            deleted = deleted.saturating_add(covered);
            covered == 0
        });
        Ok(deleted)
    }
}

// =============================================================================
// Layer
// =============================================================================

/// Failure injection for [`MemoryLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Every render succeeds.
    #[default]
    Never,
    /// The first `attempts` renders of every location fail with a retryable error.
    FirstAttempts(u32),
    /// Every render fails with a permanent error.
    Always,
    /// Rendering the given location panics.
    PanicAt(GridLocation),
}

/// A layer that records renders in a [`MemoryStorage`].
pub struct MemoryLayer {
    name: String,
    meta: MetaTiling,
    storage: Arc<MemoryStorage>,
    failure: FailureMode,
    latency: Duration,
    attempts: Mutex<HashMap<GridLocation, u32>>,
    renders: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    filter_updates: AtomicU64,
}

impl MemoryLayer {
    pub fn new(name: impl Into<String>, meta: MetaTiling, storage: Arc<MemoryStorage>) -> Self {
        Self {
            name: name.into(),
            meta,
            storage,
            failure: FailureMode::Never,
            latency: Duration::ZERO,
            attempts: Mutex::new(HashMap::new()),
            renders: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            filter_updates: AtomicU64::new(0),
        }
    }

    /// Sets the failure injection mode.
    pub fn with_failures(mut self, failure: FailureMode) -> Self {
        self.failure = failure;
        self
    }

    /// Sleeps for `latency` on every render.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    /// Successful renders.
    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Requests skipped because the tile was already cached.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Failed render attempts.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn filter_updates(&self) -> u64 {
        self.filter_updates.load(Ordering::Relaxed)
    }

    /// Render attempts recorded for `loc`, successful or not.
    pub fn attempts_at(&self, loc: &GridLocation) -> u32 {
        self.attempts.lock().get(loc).copied().unwrap_or(0)
    }

    fn fail(&self, err: LayerError) -> Result<(), LayerError> {
        self.failures.fetch_add(1, Ordering::Relaxed);
        Err(err)
    }
}

impl TileLayer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta_tiling(&self) -> MetaTiling {
        self.meta
    }

    fn seed_tile(&self, request: &TileRequest, try_cache: bool) -> Result<(), LayerError> {
        let loc = request.location();
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(loc).or_insert(0);
            *count += 1;
            *count
        };

        if try_cache && self.storage.contains(&loc) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        match self.failure {
            FailureMode::Never => {}
            FailureMode::FirstAttempts(n) if attempt <= n => {
                return self.fail(LayerError::retryable(format!(
                    "Backend timeout rendering {} (attempt {})",
                    request, attempt
                )));
            }
            FailureMode::FirstAttempts(_) => {}
            FailureMode::Always => {
                return self.fail(LayerError::permanent(format!(
                    "Backend rejected {}",
                    request
                )));
            }
            FailureMode::PanicAt(at) if at == loc => {
                panic!("renderer crashed at {}", loc);
            }
            FailureMode::PanicAt(_) => {}
        }

        self.storage.insert_meta_tile(loc, self.meta);
        self.renders.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn update_request_filters(&self, _range: &TileRange) -> Result<(), LayerError> {
        self.filter_updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLayer")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .field("failure", &self.failure)
            .field("renders", &self.renders())
            .finish()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Name-indexed set of layers.
#[derive(Default)]
pub struct MemoryLayerDispatcher {
    layers: Mutex<Vec<Arc<dyn TileLayer>>>,
}

impl MemoryLayerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer, replacing any layer of the same name.
    pub fn add(&self, layer: Arc<dyn TileLayer>) {
        let mut layers = self.layers.lock();
        layers.retain(|l| l.name() != layer.name());
        layers.push(layer);
    }
}

impl LayerDispatcher for MemoryLayerDispatcher {
    fn layer(&self, name: &str) -> Option<Arc<dyn TileLayer>> {
        self.layers.lock().iter().find(|l| l.name() == name).cloned()
    }

    fn layers(&self) -> Vec<Arc<dyn TileLayer>> {
        self.layers.lock().clone()
    }
}
