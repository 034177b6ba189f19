//! Rectangular tile ranges spanning one or more zoom levels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::location::GridLocation;

/// Errors raised when building a [`TileRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// `zoom_start` is above `zoom_stop`.
    #[error("Zoom start {start} is greater than zoom stop {stop}")]
    InvertedZooms { start: u8, stop: u8 },

    /// The number of bounds does not match the zoom span.
    #[error("Expected {expected} zoom bounds, got {actual}")]
    BoundsCount { expected: usize, actual: usize },

    /// A bounds rectangle has min above max.
    #[error("Invalid bounds at zoom {zoom}: [{min_x}, {min_y}, {max_x}, {max_y}]")]
    InvertedBounds {
        zoom: u8,
        min_x: u64,
        min_y: u64,
        max_x: u64,
        max_y: u64,
    },

    /// The tile count at or below `zoom` does not fit in 64 bits.
    #[error("Tile range at zoom {zoom} is too large to address")]
    TooLarge { zoom: u8 },
}

/// Inclusive tile bounds at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min_x: u64,
    pub min_y: u64,
    pub max_x: u64,
    pub max_y: u64,
}

impl ZoomBounds {
    pub const fn new(min_x: u64, min_y: u64, max_x: u64, max_y: u64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Number of tiles inside these bounds, or `None` if it overflows `u64`.
    pub fn tile_count(&self) -> Option<u64> {
        let width = self.max_x.checked_sub(self.min_x)?.checked_add(1)?;
        let height = self.max_y.checked_sub(self.min_y)?.checked_add(1)?;
        width.checked_mul(height)
    }

    /// Tiles of the `width` x `height` block anchored at `(x, y)` that lie
    /// inside these bounds. Zero when the anchor is outside.
    pub fn clipped_block(&self, x: u64, y: u64, width: u64, height: u64) -> u64 {
        if width == 0 || height == 0 || !self.contains(x, y) {
            return 0;
        }
        let w = (self.max_x - x).min(width - 1) + 1;
        let h = (self.max_y - y).min(height - 1) + 1;
        w.saturating_mul(h)
    }

    #[inline]
    pub fn contains(&self, x: u64, y: u64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Bounds covering the same area `levels` zoom levels deeper, or `None`
    /// if a tile index would not fit in `u64`.
    fn descend(&self, levels: u8) -> Option<Self> {
        let factor = 1u64.checked_shl(u32::from(levels))?;
        let edge = |max: u64| max.checked_add(1)?.checked_mul(factor).map(|v| v - 1);
        Some(Self {
            min_x: self.min_x.checked_mul(factor)?,
            min_y: self.min_y.checked_mul(factor)?,
            max_x: edge(self.max_x)?,
            max_y: edge(self.max_y)?,
        })
    }

    fn is_inverted(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }
}

/// The tiles of one layer a seed or truncate operation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    layer_name: String,
    grid_set: String,
    format: String,
    zoom_start: u8,
    zoom_stop: u8,
    /// One entry per zoom level, `zoom_start` first
    bounds: Vec<ZoomBounds>,
    tile_count: u64,
}

impl TileRange {
    /// Creates a tile range from explicit per-zoom bounds.
    ///
    /// Fails with [`RangeError::TooLarge`] when the total tile count does
    /// not fit in `u64`.
    pub fn new(
        layer_name: impl Into<String>,
        grid_set: impl Into<String>,
        format: impl Into<String>,
        zoom_start: u8,
        zoom_stop: u8,
        bounds: Vec<ZoomBounds>,
    ) -> Result<Self, RangeError> {
        if zoom_start > zoom_stop {
            return Err(RangeError::InvertedZooms {
                start: zoom_start,
                stop: zoom_stop,
            });
        }
        let expected = (zoom_stop - zoom_start) as usize + 1;
        if bounds.len() != expected {
            return Err(RangeError::BoundsCount {
                expected,
                actual: bounds.len(),
            });
        }
        let mut tile_count = 0u64;
        for (offset, b) in bounds.iter().enumerate() {
            let zoom = zoom_start + offset as u8;
            if b.is_inverted() {
                return Err(RangeError::InvertedBounds {
                    zoom,
                    min_x: b.min_x,
                    min_y: b.min_y,
                    max_x: b.max_x,
                    max_y: b.max_y,
                });
            }
            tile_count = b
                .tile_count()
                .and_then(|count| tile_count.checked_add(count))
                .ok_or(RangeError::TooLarge { zoom })?;
        }

        Ok(Self {
            layer_name: layer_name.into(),
            grid_set: grid_set.into(),
            format: format.into(),
            zoom_start,
            zoom_stop,
            bounds,
            tile_count,
        })
    }

    /// Creates a tile range from the bounds at `zoom_start`, doubling the
    /// covered tile indices at every deeper zoom level of a quadtree grid.
    pub fn from_base_bounds(
        layer_name: impl Into<String>,
        grid_set: impl Into<String>,
        format: impl Into<String>,
        zoom_start: u8,
        zoom_stop: u8,
        base: ZoomBounds,
    ) -> Result<Self, RangeError> {
        if zoom_start > zoom_stop {
            return Err(RangeError::InvertedZooms {
                start: zoom_start,
                stop: zoom_stop,
            });
        }
        let bounds = (0..=zoom_stop - zoom_start)
            .map(|level| {
                base.descend(level).ok_or(RangeError::TooLarge {
                    zoom: zoom_start + level,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(layer_name, grid_set, format, zoom_start, zoom_stop, bounds)
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn grid_set(&self) -> &str {
        &self.grid_set
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn zoom_start(&self) -> u8 {
        self.zoom_start
    }

    pub fn zoom_stop(&self) -> u8 {
        self.zoom_stop
    }

    /// Bounds at `zoom`, or `None` outside the zoom span.
    pub fn bounds_at(&self, zoom: u8) -> Option<&ZoomBounds> {
        if zoom < self.zoom_start || zoom > self.zoom_stop {
            return None;
        }
        self.bounds.get((zoom - self.zoom_start) as usize)
    }

    /// Total number of tiles across all zoom levels.
    pub fn tile_count(&self) -> u64 {
        self.tile_count
    }

    /// Returns true if the tile at `loc` is inside the range.
    pub fn contains(&self, loc: &GridLocation) -> bool {
        self.bounds_at(loc.zoom)
            .is_some_and(|b| b.contains(loc.x, loc.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_zoom(bounds: ZoomBounds) -> TileRange {
        TileRange::new("roads", "EPSG:4326", "image/png", 3, 3, vec![bounds]).unwrap()
    }

    #[test]
    fn test_tile_count_single_zoom() {
        let range = single_zoom(ZoomBounds::new(0, 0, 3, 1));
        assert_eq!(range.tile_count(), 8);
    }

    #[test]
    fn test_tile_count_multiple_zooms() {
        let range = TileRange::new(
            "roads",
            "EPSG:4326",
            "image/png",
            0,
            1,
            vec![ZoomBounds::new(0, 0, 0, 0), ZoomBounds::new(0, 0, 1, 1)],
        )
        .unwrap();
        assert_eq!(range.tile_count(), 5);
    }

    #[test]
    fn test_rejects_inverted_zooms() {
        let err = TileRange::new("roads", "g", "f", 5, 2, vec![]).unwrap_err();
        assert_eq!(err, RangeError::InvertedZooms { start: 5, stop: 2 });
    }

    #[test]
    fn test_rejects_wrong_bounds_count() {
        let err = TileRange::new("roads", "g", "f", 0, 2, vec![ZoomBounds::new(0, 0, 0, 0)])
            .unwrap_err();
        assert_eq!(
            err,
            RangeError::BoundsCount {
                expected: 3,
                actual: 1
            }
        );
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = TileRange::new("roads", "g", "f", 4, 4, vec![ZoomBounds::new(3, 0, 2, 0)])
            .unwrap_err();
        assert!(matches!(err, RangeError::InvertedBounds { zoom: 4, .. }));
        assert!(err.to_string().contains("zoom 4"));
    }

    #[test]
    fn test_from_base_bounds_doubles_per_level() {
        let range = TileRange::from_base_bounds(
            "roads",
            "EPSG:900913",
            "image/png",
            2,
            4,
            ZoomBounds::new(1, 1, 2, 2),
        )
        .unwrap();

        assert_eq!(range.bounds_at(2), Some(&ZoomBounds::new(1, 1, 2, 2)));
        assert_eq!(range.bounds_at(3), Some(&ZoomBounds::new(2, 2, 5, 5)));
        assert_eq!(range.bounds_at(4), Some(&ZoomBounds::new(4, 4, 11, 11)));
        assert_eq!(range.tile_count(), 4 + 16 + 64);
    }

    #[test]
    fn test_zoom_span_of_64_is_too_large() {
        let err = TileRange::from_base_bounds(
            "roads",
            "EPSG:900913",
            "image/png",
            0,
            64,
            ZoomBounds::new(0, 0, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::TooLarge { .. }));
    }

    #[test]
    fn test_tile_count_overflow_at_zoom_32_is_too_large() {
        // 2^32 x 2^32 tiles at zoom 32 is 2^64
        let err = TileRange::from_base_bounds(
            "roads",
            "EPSG:900913",
            "image/png",
            0,
            32,
            ZoomBounds::new(0, 0, 0, 0),
        )
        .unwrap_err();
        assert_eq!(err, RangeError::TooLarge { zoom: 32 });
    }

    #[test]
    fn test_full_width_bounds_are_too_large() {
        let err = TileRange::new("roads", "g", "f", 0, 0, vec![ZoomBounds::new(0, 0, u64::MAX, 0)])
            .unwrap_err();
        assert_eq!(err, RangeError::TooLarge { zoom: 0 });
    }

    #[test]
    fn test_largest_addressable_row() {
        let range =
            TileRange::new("roads", "g", "f", 0, 0, vec![ZoomBounds::new(1, 0, u64::MAX, 0)]).unwrap();
        assert_eq!(range.tile_count(), u64::MAX);
    }

    #[test]
    fn test_clipped_block() {
        let bounds = ZoomBounds::new(0, 0, 4, 3);
        assert_eq!(bounds.clipped_block(0, 0, 2, 2), 4);
        assert_eq!(bounds.clipped_block(4, 2, 2, 2), 2);
        assert_eq!(bounds.clipped_block(5, 0, 2, 2), 0);

        let edge = ZoomBounds::new(0, 0, u64::MAX, 0);
        assert_eq!(edge.clipped_block(0, 0, 3, 1), 3);
        assert_eq!(edge.clipped_block(u64::MAX, 0, 3, 1), 1);
    }

    #[test]
    fn test_contains() {
        let range = single_zoom(ZoomBounds::new(2, 2, 4, 4));
        assert!(range.contains(&GridLocation::new(2, 4, 3)));
        assert!(!range.contains(&GridLocation::new(5, 4, 3)));
        assert!(!range.contains(&GridLocation::new(2, 4, 2)));
    }
}
