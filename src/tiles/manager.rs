//! Tile manager: ties the index, loader, pool and exchange together
//!
//! Driven from the loader-side control thread with the currently wanted
//! tile coordinates. The renderer never talks to the manager directly; it
//! holds clones of the exchange and the index.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::config::EngineConfig;
use crate::core::geo::TileCoord;
use crate::index::{NodeHandle, TileIndex};
use crate::pool::BufferPool;
use crate::style::cache::StyleCache;
use crate::style::RuleTree;
use crate::tiles::loader::TileLoader;
use crate::tiles::set::TileSetExchange;
use crate::tiles::source::{Tessellator, TileSource};
use crate::tiles::tile::{Tile, TileState};
use crate::Result;

struct CachedTile {
    handle: NodeHandle,
    tile: Arc<Tile>,
}

pub struct TileManager {
    config: EngineConfig,
    index: Arc<Mutex<TileIndex>>,
    exchange: Arc<TileSetExchange>,
    pool: BufferPool,
    styles: Arc<StyleCache>,
    loader: TileLoader,
    /// every live tile, in insertion order
    entries: Vec<CachedTile>,
    /// coordinates of the last published set, sorted, for change detection
    current: Vec<TileCoord>,
}

impl TileManager {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn TileSource>,
        rules: Arc<dyn RuleTree>,
        tessellator: Arc<dyn Tessellator>,
    ) -> Self {
        let config = config.sanitize();
        let pool = BufferPool::new(config.pool_retain_chunks);
        let styles = Arc::new(StyleCache::new(rules, config.style_cache_capacity));
        let loader = TileLoader::new(
            config.loader_workers,
            source,
            styles.clone(),
            tessellator,
            pool.clone(),
        );
        Self {
            index: Arc::new(Mutex::new(TileIndex::new(config.max_zoom))),
            exchange: TileSetExchange::new(),
            pool,
            styles,
            loader,
            entries: Vec::new(),
            current: Vec::new(),
            config,
        }
    }

    /// Renderer-side handle to the visible-set handoff
    pub fn exchange(&self) -> Arc<TileSetExchange> {
        self.exchange.clone()
    }

    /// Renderer-side handle to the relation index, for proxy navigation
    pub fn index(&self) -> Arc<Mutex<TileIndex>> {
        self.index.clone()
    }

    pub fn pool(&self) -> BufferPool {
        self.pool.clone()
    }

    pub fn styles(&self) -> Arc<StyleCache> {
        self.styles.clone()
    }

    /// Number of live tiles in the cache
    pub fn live_tiles(&self) -> usize {
        self.entries.len()
    }

    /// Coordinates of jobs the workers have finished since the last call
    pub fn drain_completed(&self) -> Vec<TileCoord> {
        self.loader.done_receiver().try_iter().collect()
    }

    /// Block until the next job finishes, for callers without a frame loop
    pub fn wait_completed(&self, timeout: std::time::Duration) -> Option<TileCoord> {
        self.loader.done_receiver().recv_timeout(timeout).ok()
    }

    /// Bring the engine up to date with the wanted tile set.
    ///
    /// Resolves each coordinate through the index (creating tiles as
    /// needed), queues conversion jobs nearest-first, publishes the new
    /// visible set if it differs from the current one and evicts distant
    /// unlocked tiles beyond the cache limit. Returns whether a new set
    /// was published.
    pub fn update(&mut self, wanted: &[TileCoord], center: (f64, f64)) -> Result<bool> {
        let mut new_set: Vec<Arc<Tile>> = Vec::with_capacity(wanted.len());
        let mut jobs: Vec<Arc<Tile>> = Vec::new();

        for &coord in wanted {
            if !coord.is_valid() || coord.z > self.config.max_zoom {
                log::warn!("skipping invalid tile request {coord}");
                continue;
            }
            let tile = self.tile_for(coord)?;
            tile.set_distance(coord.distance_to(center));
            if tile.state() == TileState::None {
                jobs.push(tile.clone());
            }
            if !new_set.iter().any(|t| t.coord == coord) {
                new_set.push(tile);
            }
        }

        new_set.sort_by_key(|t| (t.coord.z, t.coord.x, t.coord.y));
        let coords: Vec<TileCoord> = new_set.iter().map(|t| t.coord).collect();
        let changed = coords != self.current;
        if changed {
            self.exchange.publish(&new_set);
            self.current = coords;
            log::debug!("published tile set of {}", new_set.len());
        }

        if !jobs.is_empty() {
            jobs.sort_by(|a, b| a.distance().total_cmp(&b.distance()));
            self.loader.set_jobs(jobs);
        }

        self.limit_cache();
        Ok(changed)
    }

    /// Remove one tile immediately, e.g. when it is superseded. Safe while
    /// its conversion is still running.
    pub fn evict(&mut self, coord: TileCoord) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.tile.coord == coord) else {
            return false;
        };
        let entry = self.entries.swap_remove(pos);
        self.drop_tile(&entry);
        true
    }

    /// Stop the loader workers and drop every live tile
    pub fn shutdown(self) {
        let TileManager {
            loader,
            entries,
            index,
            ..
        } = self;
        loader.shutdown();

        let mut index = index.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in &entries {
            entry.tile.cancel();
            entry.tile.clear_layers();
            if let Err(e) = index.remove(entry.handle) {
                log::error!("tile {} was not in the index: {e}", entry.tile.coord);
            }
        }
    }

    fn tile_for(&mut self, coord: TileCoord) -> Result<Arc<Tile>> {
        let mut index = self.lock_index();
        if let Some(tile) = index.get(coord) {
            return Ok(tile.clone());
        }
        let handle = index.insert(coord)?;
        let tile = Arc::new(Tile::new(coord));
        index.set_tile(handle, tile.clone())?;
        drop(index);

        self.entries.push(CachedTile {
            handle,
            tile: tile.clone(),
        });
        Ok(tile)
    }

    /// Evict the most distant unlocked tiles once the cache grows past its
    /// limit. Locked tiles (anything the renderer may still draw) are
    /// never touched.
    fn limit_cache(&mut self) {
        let excess = self.entries.len().saturating_sub(self.config.tile_cache_limit);
        if excess == 0 {
            return;
        }

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            self.entries[b]
                .tile
                .distance()
                .total_cmp(&self.entries[a].tile.distance())
        });

        let mut victims = Vec::with_capacity(excess);
        for pos in order {
            if victims.len() == excess {
                break;
            }
            if self.entries[pos].tile.is_locked() {
                continue;
            }
            victims.push(pos);
        }

        log::debug!("evicting {} of {} tiles", victims.len(), self.entries.len());
        victims.sort_unstable_by(|a, b| b.cmp(a));
        for pos in victims {
            let entry = self.entries.swap_remove(pos);
            self.drop_tile(&entry);
        }
    }

    fn drop_tile(&self, entry: &CachedTile) {
        entry.tile.cancel();
        entry.tile.clear_layers();
        if let Err(e) = self.lock_index().remove(entry.handle) {
            log::error!("tile {} was not in the index: {e}", entry.tile.coord);
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, TileIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{GeometryKind, Style, Tag};
    use crate::tiles::source::{Feature, StaticSource, StripTessellator};
    use std::time::Duration;

    struct MatchAll(Arc<Style>);

    impl crate::style::RuleTree for MatchAll {
        fn match_styles(
            &self,
            _kind: GeometryKind,
            _tags: &[Tag],
            _zoom_mask: u32,
            out: &mut Vec<Arc<Style>>,
        ) {
            out.push(self.0.clone());
        }
    }

    fn manager_with(tiles: &[TileCoord], config: EngineConfig) -> TileManager {
        let mut source = StaticSource::new();
        for &coord in tiles {
            source.insert(
                coord,
                vec![Feature::new(
                    GeometryKind::Line,
                    vec![Tag::new("highway", "residential")],
                    vec![[0.0, 0.0], [8.0, 8.0]],
                )],
            );
        }
        TileManager::new(
            config,
            Arc::new(source),
            Arc::new(MatchAll(Style::line(1, 0xff555555, 1.0))),
            Arc::new(StripTessellator),
        )
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            pool_retain_chunks: 32,
            style_cache_capacity: 64,
            tile_cache_limit: 4,
            max_zoom: 18,
            loader_workers: 1,
        }
    }

    #[test]
    fn test_update_publishes_and_loads() {
        let wanted = [TileCoord::new(1, 1, 3), TileCoord::new(2, 1, 3)];
        let mut manager = manager_with(&wanted, small_config());

        let changed = manager.update(&wanted, (0.2, 0.2)).unwrap();
        assert!(changed);
        assert_eq!(manager.live_tiles(), 2);

        for _ in 0..2 {
            manager.wait_completed(Duration::from_secs(5)).unwrap();
        }
        let index = manager.index();
        {
            let index = index.lock().unwrap();
            assert!(index.get(wanted[0]).unwrap().is_renderable());
            assert!(index.get(wanted[1]).unwrap().is_renderable());
            index.validate().unwrap();
        }
        manager.shutdown();
    }

    #[test]
    fn test_unchanged_set_is_not_republished() {
        let wanted = [TileCoord::new(1, 1, 3)];
        let mut manager = manager_with(&wanted, small_config());

        assert!(manager.update(&wanted, (0.0, 0.0)).unwrap());
        assert!(!manager.update(&wanted, (0.0, 0.0)).unwrap());
        // reordering or duplicates do not count as a change
        let noisy = [wanted[0], wanted[0]];
        assert!(!manager.update(&noisy, (0.0, 0.0)).unwrap());
        manager.shutdown();
    }

    #[test]
    fn test_cache_limit_evicts_distant_unlocked() {
        let all: Vec<TileCoord> = (0..8).map(|i| TileCoord::new(i, 0, 4)).collect();
        let mut manager = manager_with(&all, small_config());

        // first batch becomes the published (locked) set
        manager.update(&all[..2], (0.0, 0.0)).unwrap();
        // request far tiles one batch at a time without publishing them
        // as part of the visible set growing beyond the limit
        manager.update(&all, (0.0, 0.0)).unwrap();

        // cache limit is 4 and all 8 are locked by the published set, so
        // nothing can be evicted yet
        assert_eq!(manager.live_tiles(), 8);

        // shrink the visible set; retire the old one through an acquire +
        // republish cycle so distant tiles unlock
        let exchange = manager.exchange();
        let mut draw = crate::tiles::set::TileSet::new();
        exchange.acquire(&mut draw);
        manager.update(&all[..2], (0.0, 0.0)).unwrap();
        exchange.acquire(&mut draw);
        manager.update(&all[..2], (0.0, 0.0)).unwrap();

        assert!(manager.live_tiles() <= 4);
        let index = manager.index();
        index.lock().unwrap().validate().unwrap();
        manager.shutdown();
    }

    #[test]
    fn test_evict_in_flight_tile_is_safe() {
        let wanted = [TileCoord::new(1, 1, 3)];
        let mut manager = manager_with(&wanted, small_config());
        manager.update(&wanted, (0.0, 0.0)).unwrap();

        assert!(manager.evict(wanted[0]));
        assert!(!manager.evict(wanted[0]));
        assert_eq!(manager.live_tiles(), 0);

        let index = manager.index();
        {
            let guard = index.lock().unwrap();
            assert!(guard.get(wanted[0]).is_none());
            guard.validate().unwrap();
        }
        manager.shutdown();
    }
}
