//! Renderer-facing helpers: layer compilation and proxy fallback
//!
//! Draw-call issuance stays outside the crate; this module turns a built
//! tile's chunk chains into contiguous upload-ready arrays and finds a
//! substitute tile when the exact one is not ready.

use std::sync::Arc;

use crate::core::geo::TileCoord;
use crate::index::TileIndex;
use crate::pool::Vertex;
use crate::style::Style;
use crate::tiles::tile::{Tile, TileState};

/// One geometry layer serialized for GPU upload, ordered by drawing level
#[derive(Debug)]
pub struct CompiledLayer {
    pub level: u8,
    pub style: Arc<Style>,
    pub vertices: Vec<Vertex>,
}

impl CompiledLayer {
    /// Raw bytes for the vertex buffer upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Serialize a tile's freshly built layers into contiguous vertex arrays,
/// returning the backing chunks to the pool, and flip the tile to
/// `Ready`. Tiles in any other state yield nothing: `Ready` tiles were
/// uploaded on an earlier frame and the renderer keeps their buffers.
pub fn compile_tile(tile: &Tile) -> Vec<CompiledLayer> {
    if tile.state() != TileState::NewData {
        return Vec::new();
    }

    let mut compiled = tile.with_layers(|layers| {
        let mut out = Vec::with_capacity(layers.len());
        for layer in layers.iter_mut() {
            let mut vertices = Vec::with_capacity(layer.buffer.len());
            layer.buffer.compile_into(&mut vertices);
            if vertices.is_empty() {
                continue;
            }
            out.push(CompiledLayer {
                level: layer.key.level,
                style: layer.style.clone(),
                vertices,
            });
        }
        out
    });
    compiled.sort_by_key(|layer| layer.level);

    tile.mark_ready();
    log::debug!(
        "compiled tile {}: {} layers, {} vertices",
        tile.coord,
        compiled.len(),
        compiled.iter().map(|l| l.vertices.len()).sum::<usize>()
    );
    compiled
}

/// Find something drawable at `coord`: the exact tile when it has data,
/// otherwise the nearest renderable ancestor, otherwise a renderable
/// direct child. Returns `None` when nothing in the neighborhood is
/// ready; the caller leaves the area blank for this frame.
pub fn resolve_proxy(index: &TileIndex, coord: TileCoord) -> Option<Arc<Tile>> {
    if let Some(tile) = index.get(coord) {
        if tile.is_renderable() {
            return Some(tile.clone());
        }
    }

    if let Some(ancestor) = index.nearest_ancestor(coord, Tile::is_renderable) {
        return Some(ancestor);
    }

    let node = index.node_at(coord)?;
    for quadrant in 0..4u8 {
        let Ok(Some(child)) = index.child(node, quadrant) else {
            continue;
        };
        if let Ok(Some(tile)) = index.tile(child) {
            if tile.is_renderable() {
                return Some(tile.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use crate::tiles::layers::LayerSet;

    fn built_tile(pool: &BufferPool, coord: TileCoord) -> Tile {
        let tile = Tile::new(coord);
        assert!(tile.try_begin_loading());

        let mut layers = LayerSet::new();
        let top = Style::line(3, 0xffffffff, 1.0);
        let bottom = Style::area(0, 0xff222222);
        layers
            .layer(pool, &top)
            .buffer
            .extend_from_slice(&[Vertex::new(1, 1, 0, 0); 4]);
        layers
            .layer(pool, &bottom)
            .buffer
            .extend_from_slice(&[Vertex::new(2, 2, 0, 0); 6]);
        assert!(tile.complete(layers));
        tile
    }

    #[test]
    fn test_compile_orders_levels_and_pools_chunks() {
        let pool = BufferPool::new(16);
        let tile = built_tile(&pool, TileCoord::new(1, 1, 2));

        let compiled = compile_tile(&tile);
        assert_eq!(tile.state(), TileState::Ready);
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].level, 0);
        assert_eq!(compiled[1].level, 3);
        assert_eq!(compiled[0].vertices.len(), 6);
        assert_eq!(compiled[0].as_bytes().len(), 6 * std::mem::size_of::<Vertex>());
        // chunks went back to the pool during compilation
        assert_eq!(pool.stats().in_use(), 0);

        // a second compile has nothing new to upload
        assert!(compile_tile(&tile).is_empty());
    }

    #[test]
    fn test_compile_skips_loading_tiles() {
        let tile = Tile::new(TileCoord::new(0, 0, 1));
        assert!(compile_tile(&tile).is_empty());
        assert_eq!(tile.state(), TileState::None);
    }

    #[test]
    fn test_proxy_prefers_exact_then_ancestor() {
        let pool = BufferPool::new(16);
        let mut index = TileIndex::new(10);

        let parent_coord = TileCoord::new(4, 4, 4);
        let child_coord = parent_coord.child(0);

        let handle = index.insert(parent_coord).unwrap();
        index
            .set_tile(handle, Arc::new(built_tile(&pool, parent_coord)))
            .unwrap();

        // exact tile still loading: the ready parent substitutes
        let loading = Arc::new(Tile::new(child_coord));
        assert!(loading.try_begin_loading());
        let handle = index.insert(child_coord).unwrap();
        index.set_tile(handle, loading).unwrap();

        let proxy = resolve_proxy(&index, child_coord).unwrap();
        assert_eq!(proxy.coord, parent_coord);

        // once the exact tile is ready it wins
        let ready = Arc::new(built_tile(&pool, child_coord));
        index.set_tile(handle, ready).unwrap();
        let proxy = resolve_proxy(&index, child_coord).unwrap();
        assert_eq!(proxy.coord, child_coord);
    }

    #[test]
    fn test_proxy_falls_back_to_child() {
        let pool = BufferPool::new(16);
        let mut index = TileIndex::new(10);

        let coord = TileCoord::new(2, 2, 3);
        let child_coord = coord.child(3);
        let handle = index.insert(coord).unwrap();
        index
            .set_tile(handle, Arc::new(Tile::new(coord)))
            .unwrap();
        let child_handle = index.insert(child_coord).unwrap();
        index
            .set_tile(child_handle, Arc::new(built_tile(&pool, child_coord)))
            .unwrap();

        let proxy = resolve_proxy(&index, coord).unwrap();
        assert_eq!(proxy.coord, child_coord);
    }

    #[test]
    fn test_proxy_none_when_nothing_ready() {
        let index = TileIndex::new(10);
        assert!(resolve_proxy(&index, TileCoord::new(1, 1, 1)).is_none());
    }
}
