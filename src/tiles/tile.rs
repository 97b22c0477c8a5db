//! The tile payload and its lifecycle state
//!
//! A tile is shared between the loader (which fills its layers), the
//! manager (which owns eviction) and the renderer (which draws it), so the
//! mutable pieces sit behind atomics and one short mutex.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::core::geo::TileCoord;
use crate::tiles::layers::LayerSet;

/// Lifecycle of a tile's data.
///
/// `Loading` belongs to the loader, `NewData` means layers are built but
/// not yet uploaded, `Ready` means uploaded. `Canceled` marks a tile
/// removed from the manager while a conversion may still be running; the
/// conversion notices and discards its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TileState {
    None = 0,
    Loading = 1,
    NewData = 2,
    Ready = 3,
    Canceled = 4,
}

impl TileState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::NewData,
            3 => Self::Ready,
            4 => Self::Canceled,
            _ => Self::None,
        }
    }
}

#[derive(Debug)]
pub struct Tile {
    pub coord: TileCoord,
    state: AtomicU8,
    /// render locks; a locked tile is never evicted or cleared
    locks: AtomicU32,
    /// distance from the view center, f32 bits
    distance: AtomicU32,
    layers: Mutex<LayerSet>,
}

impl Tile {
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            state: AtomicU8::new(TileState::None as u8),
            locks: AtomicU32::new(0),
            distance: AtomicU32::new(0f32.to_bits()),
            layers: Mutex::new(LayerSet::new()),
        }
    }

    pub fn state(&self) -> TileState {
        TileState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Loading, built or uploaded; canceled tiles are not active
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            TileState::Loading | TileState::NewData | TileState::Ready
        )
    }

    /// Has data a renderer could draw (directly or as a proxy)
    pub fn is_renderable(&self) -> bool {
        matches!(self.state(), TileState::NewData | TileState::Ready)
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TileState::Canceled
    }

    /// Claim the tile for loading. Fails when it is already in flight,
    /// built or canceled.
    pub(crate) fn try_begin_loading(&self) -> bool {
        self.state
            .compare_exchange(
                TileState::None as u8,
                TileState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Attach a fully built layer set and flip to `NewData`. Fails (and the
    /// layers are dropped, returning their chunks to the pool) when the
    /// tile was canceled while converting; the tile then keeps its prior
    /// state and data.
    pub(crate) fn complete(&self, layers: LayerSet) -> bool {
        let claimed = self
            .state
            .compare_exchange(
                TileState::Loading as u8,
                TileState::NewData as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            *self.lock_layers() = layers;
        }
        claimed
    }

    /// Put a failed load back to `None` so the next update can retry it
    pub(crate) fn fail(&self) {
        let _ = self.state.compare_exchange(
            TileState::Loading as u8,
            TileState::None as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark uploaded data as current
    pub(crate) fn mark_ready(&self) {
        let _ = self.state.compare_exchange(
            TileState::NewData as u8,
            TileState::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Withdraw the tile; an in-flight conversion will discard its output
    pub(crate) fn cancel(&self) {
        self.state
            .store(TileState::Canceled as u8, Ordering::Release);
    }

    pub(crate) fn lock_render(&self) {
        self.locks.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unlock_render(&self) {
        let prev = self.locks.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "render unlock without matching lock");
    }

    /// True while any tile set (drawing or pending) references this tile
    pub fn is_locked(&self) -> bool {
        self.locks.load(Ordering::Acquire) > 0
    }

    pub fn set_distance(&self, distance: f32) {
        self.distance.store(distance.to_bits(), Ordering::Relaxed);
    }

    /// Distance from the view center as of the last update
    pub fn distance(&self) -> f32 {
        f32::from_bits(self.distance.load(Ordering::Relaxed))
    }

    /// Run `f` over the layer set under the tile's mutex. Keep the closure
    /// short; the renderer and loader share this lock.
    pub fn with_layers<R>(&self, f: impl FnOnce(&mut LayerSet) -> R) -> R {
        f(&mut self.lock_layers())
    }

    /// Drop the tile's layers, returning their chunks to the pool
    pub(crate) fn clear_layers(&self) {
        *self.lock_layers() = LayerSet::new();
    }

    fn lock_layers(&self) -> std::sync::MutexGuard<'_, LayerSet> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let tile = Tile::new(TileCoord::new(1, 2, 3));
        assert_eq!(tile.state(), TileState::None);
        assert!(tile.try_begin_loading());
        assert!(!tile.try_begin_loading());

        assert!(tile.complete(LayerSet::new()));
        assert_eq!(tile.state(), TileState::NewData);
        assert!(tile.is_renderable());

        tile.mark_ready();
        assert_eq!(tile.state(), TileState::Ready);
    }

    #[test]
    fn test_cancel_beats_completion() {
        let tile = Tile::new(TileCoord::new(0, 0, 1));
        assert!(tile.try_begin_loading());
        tile.cancel();

        // the conversion finishing late must not resurrect the tile
        assert!(!tile.complete(LayerSet::new()));
        assert_eq!(tile.state(), TileState::Canceled);
        assert!(!tile.is_active());
    }

    #[test]
    fn test_failed_load_retries() {
        let tile = Tile::new(TileCoord::new(0, 0, 1));
        assert!(tile.try_begin_loading());
        tile.fail();
        assert_eq!(tile.state(), TileState::None);
        assert!(tile.try_begin_loading());
    }

    #[test]
    fn test_render_locks_nest() {
        let tile = Tile::new(TileCoord::new(0, 0, 1));
        tile.lock_render();
        tile.lock_render();
        tile.unlock_render();
        assert!(tile.is_locked());
        tile.unlock_render();
        assert!(!tile.is_locked());
    }
}
