//! Layer and storage collaborators.
//!
//! The scheduler never renders or stores tiles itself. Seed tasks hand each
//! drawn location to a [`TileLayer`]; truncate tasks ask a
//! [`StorageBroker`] to delete a range. Layers are resolved by name through
//! a [`LayerDispatcher`].
//!
//! ```text
//! ┌──────────────┐  seed_tile()   ┌──────────────┐
//! │  Seed task   │ ─────────────► │  TileLayer   │
//! └──────────────┘                └──────────────┘
//! ┌──────────────┐  delete_range() ┌──────────────┐
//! │Truncate task │ ─────────────► │StorageBroker │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! The [`memory`] module provides in-process implementations backed by a
//! shared tile set, used by the CLI demo and the test suites.

pub mod memory;
mod traits;

pub use memory::{FailureMode, MemoryLayer, MemoryLayerDispatcher, MemoryStorage};
pub use traits::{LayerDispatcher, LayerError, StorageBroker, StorageError, TileLayer};
