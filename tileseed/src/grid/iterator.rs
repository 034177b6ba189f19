//! Thread-safe meta-tile cursor over a [`TileRange`].

use parking_lot::Mutex;

use super::location::{GridLocation, MetaTiling};
use super::range::TileRange;

/// A shared source of grid work.
///
/// Every draw returns a location no other draw has returned, or `None`
/// once the source is exhausted. After the first `None` every later draw
/// also returns `None`.
pub trait LocationSource: Send + Sync {
    /// Draws the next unit of work.
    fn draw_next(&self) -> Option<GridLocation>;

    /// Number of real tiles covered by the unit of work at `loc`.
    fn tiles_for_location(&self, _loc: &GridLocation) -> u64 {
        1
    }
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    At(GridLocation),
    Exhausted,
}

/// Walks a tile range one meta-tile at a time.
///
/// Zoom levels are visited from `zoom_start` upward; within a level, rows
/// from `min_y` and columns from `min_x`, stepping by the meta-tiling
/// factors. Each location is the lower-left tile of its meta-tile.
#[derive(Debug)]
pub struct TileRangeIterator {
    range: TileRange,
    meta: MetaTiling,
    cursor: Mutex<Cursor>,
}

impl TileRangeIterator {
    pub fn new(range: TileRange, meta: MetaTiling) -> Self {
        let start = range
            .bounds_at(range.zoom_start())
            .map(|b| Cursor::At(GridLocation::new(b.min_x, b.min_y, range.zoom_start())))
            .unwrap_or(Cursor::Exhausted);

        Self {
            range,
            meta,
            cursor: Mutex::new(start),
        }
    }

    pub fn range(&self) -> &TileRange {
        &self.range
    }

    pub fn meta_tiling(&self) -> MetaTiling {
        self.meta
    }

    /// Location that follows `loc`, or `Exhausted` past the last zoom.
    fn advance(&self, loc: GridLocation) -> Cursor {
        let Some(bounds) = self.range.bounds_at(loc.zoom) else {
            return Cursor::Exhausted;
        };

        match loc.x.checked_add(u64::from(self.meta.x)) {
            Some(x) if x <= bounds.max_x => {
                return Cursor::At(GridLocation::new(x, loc.y, loc.zoom));
            }
            _ => {}
        }

        match loc.y.checked_add(u64::from(self.meta.y)) {
            Some(y) if y <= bounds.max_y => {
                return Cursor::At(GridLocation::new(bounds.min_x, y, loc.zoom));
            }
            _ => {}
        }

        if loc.zoom >= self.range.zoom_stop() {
            return Cursor::Exhausted;
        }
        let zoom = loc.zoom + 1;
        match self.range.bounds_at(zoom) {
            Some(next) => Cursor::At(GridLocation::new(next.min_x, next.min_y, zoom)),
            None => Cursor::Exhausted,
        }
    }
}

impl LocationSource for TileRangeIterator {
    fn draw_next(&self) -> Option<GridLocation> {
        let mut cursor = self.cursor.lock();
        match *cursor {
            Cursor::Exhausted => None,
            Cursor::At(loc) => {
                *cursor = self.advance(loc);
                Some(loc)
            }
        }
    }

    fn tiles_for_location(&self, loc: &GridLocation) -> u64 {
        self.range.bounds_at(loc.zoom).map_or(0, |bounds| {
            bounds.clipped_block(loc.x, loc.y, u64::from(self.meta.x), u64::from(self.meta.y))
        })
    }
}
