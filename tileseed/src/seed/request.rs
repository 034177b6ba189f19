//! Caller-facing description of a seed, reseed or truncate request.

use serde::Serialize;

use super::TaskType;
use crate::grid::{TileRange, ZoomBounds, RangeError};

pub const DEFAULT_GRID_SET: &str = "EPSG:900913";
pub const DEFAULT_FORMAT: &str = "image/png";

/// A request to operate on a rectangular area of a layer.
///
/// `bounds` are given at `zoom_start` and cover the same area at every
/// deeper level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedRequest {
    pub layer: String,
    pub grid_set: String,
    pub format: String,
    pub zoom_start: u8,
    pub zoom_stop: u8,
    pub bounds: ZoomBounds,
    pub task_type: TaskType,
    /// Requested worker count; non-positive values mean one.
    pub threads: i64,
    pub filter_update: bool,
}

impl SeedRequest {
    /// A single-threaded request for the zoom 0 tile of `layer`.
    pub fn new(layer: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            layer: layer.into(),
            grid_set: DEFAULT_GRID_SET.to_string(),
            format: DEFAULT_FORMAT.to_string(),
            zoom_start: 0,
            zoom_stop: 0,
            bounds: ZoomBounds::new(0, 0, 0, 0),
            task_type,
            threads: 1,
            filter_update: false,
        }
    }

    pub fn with_zooms(mut self, zoom_start: u8, zoom_stop: u8) -> Self {
        self.zoom_start = zoom_start;
        self.zoom_stop = zoom_stop;
        self
    }

    pub fn with_bounds(mut self, bounds: ZoomBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_threads(mut self, threads: i64) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_filter_update(mut self, filter_update: bool) -> Self {
        self.filter_update = filter_update;
        self
    }

    pub fn with_grid_set(mut self, grid_set: impl Into<String>) -> Self {
        self.grid_set = grid_set.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Expands the request into a per-zoom tile range.
    pub fn tile_range(&self) -> Result<TileRange, RangeError> {
        TileRange::from_base_bounds(
            self.layer.clone(),
            self.grid_set.clone(),
            self.format.clone(),
            self.zoom_start,
            self.zoom_stop,
            self.bounds,
        )
    }
}
