//! Tile grid addressing for seeding work.
//!
//! A seed or truncate job covers a [`TileRange`]: a rectangle of tile
//! coordinates per zoom level for one layer. Work is handed out one
//! meta-tile at a time by a [`TileRangeIterator`], which every task of a
//! job draws from concurrently.
//!
//! ```text
//!            TileRange (zoom 0..=N, per-zoom bounds)
//!                          │
//!                          ▼
//!   TileRangeIterator ── draw_next() ──► GridLocation {x, y, zoom}
//!     (meta-tile stride,                       │
//!      internally locked)                      ▼
//!                                   TileRequest handed to a layer
//! ```

mod iterator;
mod location;
mod range;
mod request;

pub use iterator::{LocationSource, TileRangeIterator};
pub use location::{GridLocation, MetaTiling};
pub use range::{RangeError, TileRange, ZoomBounds};
pub use request::TileRequest;
