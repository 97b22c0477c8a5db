//! Prelude module for common tilestream types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use tilestream::prelude::*;`

pub use crate::core::{
    config::{EngineConfig, EngineProfile},
    geo::{TileCoord, MAX_ZOOM},
};

pub use crate::index::{NodeHandle, TileIndex};

pub use crate::pool::{BufferPool, PoolStats, Vertex, VertexBuffer};

pub use crate::style::{
    cache::StyleCache, GeometryKind, RuleTree, Style, StyleList, Tag, TagSignature,
};

pub use crate::tiles::{
    manager::TileManager,
    set::{TileSet, TileSetExchange},
    source::{Feature, StaticSource, StripTessellator, Tessellator, TileSource},
    tile::{Tile, TileState},
    LayerSet,
};

pub use crate::render::{compile_tile, resolve_proxy, CompiledLayer};

pub use crate::{Error, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
