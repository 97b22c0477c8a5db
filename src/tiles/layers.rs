//! Geometry layers: per-tile buckets of tessellated vertices
//!
//! One layer per (drawing level, style) pair; a tile's conversion pass
//! creates layers on first use and writes every matching feature into
//! them. Chunks flow back to the pool when the set is replaced or dropped.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::pool::{BufferPool, VertexBuffer};
use crate::style::Style;

/// Identifies one geometry layer within a tile: drawing level plus the
/// visual parameters of its style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerKey {
    pub level: u8,
    pub style: u64,
}

impl LayerKey {
    pub fn of(style: &Style) -> Self {
        Self {
            level: style.level,
            style: style.layer_key(),
        }
    }
}

/// Tessellated vertices sharing one drawing level and style within a tile
#[derive(Debug)]
pub struct GeometryLayer {
    pub key: LayerKey,
    pub style: Arc<Style>,
    pub buffer: VertexBuffer,
}

impl GeometryLayer {
    pub fn vertex_count(&self) -> usize {
        self.buffer.len()
    }
}

/// All geometry layers of one tile, in creation order
#[derive(Debug, Default)]
pub struct LayerSet {
    layers: Vec<GeometryLayer>,
    lookup: FxHashMap<LayerKey, usize>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the layer for `style`, creating it on first use
    pub fn layer(&mut self, pool: &BufferPool, style: &Arc<Style>) -> &mut GeometryLayer {
        let key = LayerKey::of(style);
        if let Some(&index) = self.lookup.get(&key) {
            return &mut self.layers[index];
        }
        self.layers.push(GeometryLayer {
            key,
            style: style.clone(),
            buffer: VertexBuffer::new(pool),
        });
        let index = self.layers.len() - 1;
        self.lookup.insert(key, index);
        &mut self.layers[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeometryLayer> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GeometryLayer> {
        self.layers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total vertices across all layers
    pub fn vertex_count(&self) -> usize {
        self.layers.iter().map(|l| l.buffer.len()).sum()
    }
}
