//! The visible-tile handoff between loader and renderer
//!
//! Exactly two tile-set snapshots circulate: the one the renderer is
//! drawing and the one the loader last published. The swap is the single
//! synchronization point between the two threads; the renderer can only
//! ever observe a fully built set.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::tiles::tile::Tile;

/// An immutable-for-the-reader snapshot of drawable tiles
#[derive(Debug, Default)]
pub struct TileSet {
    tiles: Vec<Arc<Tile>>,
    serial: u64,
}

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tile>> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Increments once per published set; lets a consumer tell whether its
    /// snapshot changed
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Debug, Default)]
struct Slot {
    pending: TileSet,
    dirty: bool,
    serial: u64,
}

/// Double-buffered tile-set exchange.
///
/// The loader [`publish`](Self::publish)es a finished set; the renderer
/// [`acquire`](Self::acquire)s it once per frame. Tiles present in both
/// the outgoing and incoming set never drop to zero render locks during
/// the swap, so a tile that stays visible is never momentarily
/// evictable.
#[derive(Debug, Default)]
pub struct TileSetExchange {
    slot: Mutex<Slot>,
}

impl TileSetExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the pending set with a fully built tile list. Locks the
    /// incoming tiles before unlocking the outgoing ones, then flips the
    /// dirty flag for the renderer.
    pub fn publish(&self, tiles: &[Arc<Tile>]) {
        for tile in tiles {
            tile.lock_render();
        }

        let mut slot = self.lock();
        for tile in &slot.pending.tiles {
            tile.unlock_render();
        }
        slot.pending.tiles.clear();
        slot.pending.tiles.extend(tiles.iter().cloned());
        slot.serial += 1;
        slot.pending.serial = slot.serial;
        slot.dirty = true;
    }

    /// Renderer entry point, called once per frame. When a new set is
    /// pending it is swapped into `draw`, the retired set is unlocked, and
    /// `true` is returned; otherwise `draw` is left untouched.
    pub fn acquire(&self, draw: &mut TileSet) -> bool {
        let mut slot = self.lock();
        if !slot.dirty {
            return false;
        }
        std::mem::swap(draw, &mut slot.pending);
        for tile in &slot.pending.tiles {
            tile.unlock_render();
        }
        slot.pending.tiles.clear();
        slot.dirty = false;
        true
    }

    /// True when a published set has not been acquired yet
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Unlock everything on teardown: the retired draw set and whatever is
    /// still pending
    pub fn release(&self, draw: &mut TileSet) {
        for tile in &draw.tiles {
            tile.unlock_render();
        }
        draw.tiles.clear();

        let mut slot = self.lock();
        for tile in &slot.pending.tiles {
            tile.unlock_render();
        }
        slot.pending.tiles.clear();
        slot.dirty = false;
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
