//! Per-location seed request handed to a layer.

use super::location::GridLocation;

/// Request to render (or re-render) the meta-tile at one grid location.
///
/// # Example
///
/// ```
/// use tileseed::grid::{GridLocation, TileRequest};
///
/// let request = TileRequest::from(GridLocation::new(4, 5, 6));
/// assert_eq!(request.x(), 4);
/// assert_eq!(request.y(), 5);
/// assert_eq!(request.zoom(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRequest {
    location: GridLocation,
}

impl TileRequest {
    pub fn new(x: u64, y: u64, zoom: u8) -> Self {
        Self {
            location: GridLocation::new(x, y, zoom),
        }
    }

    /// Column of the request.
    pub fn x(&self) -> u64 {
        self.location.x
    }

    /// Row of the request.
    pub fn y(&self) -> u64 {
        self.location.y
    }

    pub fn zoom(&self) -> u8 {
        self.location.zoom
    }

    pub fn location(&self) -> GridLocation {
        self.location
    }
}

impl From<GridLocation> for TileRequest {
    fn from(location: GridLocation) -> Self {
        Self { location }
    }
}

impl std::fmt::Display for TileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TileRequest{}", self.location)
    }
}
