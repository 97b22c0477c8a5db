//! # tilestream
//!
//! A streaming core for hierarchically tiled vector map data.
//!
//! The crate keeps three moving parts consistent under concurrent mutation
//! without stalling either the tile loader or the renderer:
//!
//! - a quadtree [`index::TileIndex`] with O(depth) lookup of a tile's
//!   ancestor/descendant proxies while tiles are created and evicted,
//! - a chunked [`pool::BufferPool`] that recycles fixed-size geometry
//!   storage across thousands of per-frame tessellation passes,
//! - a [`tiles::set::TileSetExchange`] that swaps the whole visible tile
//!   set between loader and renderer without the renderer ever observing
//!   a half-updated set,
//! - a [`style::cache::StyleCache`] that turns a linear rule-tree walk
//!   into an amortized O(1) lookup keyed by tag set and zoom level.
//!
//! GPU upload, glyph rasterization, rule parsing and tile fetching live
//! behind traits; this crate holds no I/O.

pub mod core;
pub mod index;
pub mod pool;
pub mod prelude;
pub mod render;
pub mod style;
pub mod tiles;

// Re-export public API
pub use crate::core::{
    config::{EngineConfig, EngineProfile},
    geo::{TileCoord, MAX_ZOOM},
};

pub use index::{NodeHandle, TileIndex};

pub use pool::{BufferPool, Chunk, PoolStats, Vertex, VertexBuffer, CHUNK_VERTICES};

pub use style::{
    cache::{CacheStats, StyleCache},
    GeometryKind, RuleTree, Style, StyleList, Tag, TagSignature,
};

pub use tiles::{
    loader::{convert_tile, TileLoader},
    manager::TileManager,
    set::{TileSet, TileSetExchange},
    source::{Feature, FeatureStream, StaticSource, StripTessellator, Tessellator, TileSource},
    tile::{Tile, TileState},
    GeometryLayer, LayerKey, LayerSet,
};

pub use render::{compile_tile, resolve_proxy, CompiledLayer};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid tile coordinate: {0}")]
    InvalidCoord(String),

    #[error("stale or already removed tile handle")]
    StaleHandle,

    #[error("zoom level {0} outside the supported range")]
    ZoomOutOfRange(u8),

    #[error("tile decode failed: {0}")]
    Decode(String),

    #[error("tile load canceled")]
    Canceled,
}
