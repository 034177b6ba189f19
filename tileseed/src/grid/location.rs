//! Grid location and meta-tiling types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::TryFromIntError;

/// Position of a tile (or the lower-left tile of a meta-tile) in a grid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridLocation {
    /// Column, 0 at the west edge of the grid
    pub x: u64,
    /// Row, 0 at the south edge of the grid
    pub y: u64,
    /// Zoom level
    pub zoom: u8,
}

impl GridLocation {
    /// Creates a grid location.
    #[inline]
    pub const fn new(x: u64, y: u64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }
}

impl fmt::Display for GridLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}, {}>", self.x, self.y, self.zoom)
    }
}

/// Converts the `[x, y, zoom]` triple form. Fails if the zoom does not fit in `u8`.
impl TryFrom<[u64; 3]> for GridLocation {
    type Error = TryFromIntError;

    fn try_from([x, y, zoom]: [u64; 3]) -> Result<Self, Self::Error> {
        Ok(Self::new(x, y, u8::try_from(zoom)?))
    }
}

/// Meta-tiling factors of a layer.
///
/// Layers render a block of `x` by `y` tiles in one backend request, so
/// seeding hands out work at that granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaTiling {
    pub x: u32,
    pub y: u32,
}

impl MetaTiling {
    /// Creates meta-tiling factors. Zero factors are raised to 1.
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            x: x.max(1),
            y: y.max(1),
        }
    }

    /// Number of tiles in one full meta-tile.
    #[inline]
    pub fn tiles_per_meta_tile(&self) -> u64 {
        self.x as u64 * self.y as u64
    }
}

impl Default for MetaTiling {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(GridLocation::new(1, 2, 3).to_string(), "<1, 2, 3>");
    }

    #[test]
    fn test_location_from_array() {
        assert_eq!(GridLocation::try_from([4, 5, 6]), Ok(GridLocation::new(4, 5, 6)));
    }

    #[test]
    fn test_location_from_array_rejects_wide_zoom() {
        assert!(GridLocation::try_from([0, 0, 256]).is_err());
        assert!(GridLocation::try_from([0, 0, u64::MAX]).is_err());
    }

    #[test]
    fn test_meta_tiling_clamps_zero() {
        let meta = MetaTiling::new(0, 3);
        assert_eq!(meta.x, 1);
        assert_eq!(meta.y, 3);
        assert_eq!(meta.tiles_per_meta_tile(), 3);
    }

    #[test]
    fn test_meta_tiling_default() {
        assert_eq!(MetaTiling::default().tiles_per_meta_tile(), 1);
    }
}
