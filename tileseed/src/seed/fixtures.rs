//! Shared builders for scheduler unit tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::job::{JobParts, SeedJob};
use super::{Job, JobKind};
use crate::config::SeedConfig;
use crate::grid::{GridLocation, LocationSource, MetaTiling, TileRange, TileRangeIterator, ZoomBounds};
use crate::layer::{FailureMode, MemoryLayer, MemoryStorage, StorageBroker, TileLayer};

/// Hands out a fixed list of locations, then `None` forever.
pub(crate) struct ScriptedSource {
    locations: Mutex<VecDeque<GridLocation>>,
}

impl ScriptedSource {
    pub(crate) fn new(locations: Vec<GridLocation>) -> Self {
        Self {
            locations: Mutex::new(locations.into()),
        }
    }
}

impl LocationSource for ScriptedSource {
    fn draw_next(&self) -> Option<GridLocation> {
        self.locations.lock().pop_front()
    }
}

/// Whole-world range of `layer` from `zoom_start` to `zoom_stop`.
pub(crate) fn range_for(layer: &str, zoom_start: u8, zoom_stop: u8) -> TileRange {
    let edge = (1u64 << zoom_start) - 1;
    TileRange::from_base_bounds(
        layer,
        "EPSG:900913",
        "image/png",
        zoom_start,
        zoom_stop,
        ZoomBounds::new(0, 0, edge, edge),
    )
    .unwrap()
}

/// Zoom 0..=2 of "roads": 21 tiles.
pub(crate) fn small_range() -> TileRange {
    range_for("roads", 0, 2)
}

pub(crate) fn memory_layer(failure: FailureMode) -> Arc<MemoryLayer> {
    Arc::new(
        MemoryLayer::new("roads", MetaTiling::default(), Arc::new(MemoryStorage::new()))
            .with_failures(failure),
    )
}

fn build(
    layer: Arc<dyn TileLayer>,
    range: TileRange,
    source: Box<dyn LocationSource>,
    kind: JobKind,
    threads: usize,
    filter_update: bool,
) -> Job {
    Job::new(JobParts {
        id: 0,
        breeder_id: 0,
        layer,
        range,
        source,
        kind,
        thread_count: threads,
        filter_update,
    })
}

pub(crate) fn seed_job(
    layer: &Arc<MemoryLayer>,
    range: TileRange,
    threads: usize,
    config: SeedConfig,
    reseed: bool,
) -> Job {
    let source = Box::new(TileRangeIterator::new(range.clone(), layer.meta_tiling()));
    build(
        layer.clone(),
        range,
        source,
        JobKind::Seed(SeedJob::new(reseed, config)),
        threads,
        false,
    )
}

pub(crate) fn seed_job_with_filter_update(layer: &Arc<MemoryLayer>, range: TileRange) -> Job {
    let source = Box::new(TileRangeIterator::new(range.clone(), layer.meta_tiling()));
    build(
        layer.clone(),
        range,
        source,
        JobKind::Seed(SeedJob::new(false, SeedConfig::default())),
        1,
        true,
    )
}

/// Seed job whose tasks draw from a scripted list of locations.
pub(crate) fn scripted_job(threads: usize, locations: Vec<GridLocation>) -> Job {
    let layer = memory_layer(FailureMode::Never);
    build(
        layer,
        small_range(),
        Box::new(ScriptedSource::new(locations)),
        JobKind::Seed(SeedJob::new(false, SeedConfig::default())),
        threads,
        false,
    )
}

pub(crate) fn truncate_job_on(layer: &Arc<MemoryLayer>, range: TileRange) -> Job {
    let storage: Arc<dyn StorageBroker> = layer.storage().clone();
    let source = Box::new(TileRangeIterator::new(range.clone(), layer.meta_tiling()));
    build(
        layer.clone(),
        range,
        source,
        JobKind::Truncate { storage },
        1,
        false,
    )
}

pub(crate) fn truncate_job(range: TileRange) -> Job {
    truncate_job_on(&memory_layer(FailureMode::Never), range)
}
