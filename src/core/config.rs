//! Configuration for cache sizes, pool limits and loader behavior
//!
//! Presets cover the common trade-offs; `Custom` takes a fully spelled out
//! configuration.

use serde::{Deserialize, Serialize};

use crate::core::geo::MAX_ZOOM;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineProfile {
    Balanced,
    LowMemory,
    HighQuality,
    Custom(EngineConfig),
}

impl EngineProfile {
    pub fn resolve(&self) -> EngineConfig {
        match self {
            Self::Balanced => EngineConfig {
                pool_retain_chunks: 500,
                style_cache_capacity: 512,
                tile_cache_limit: 200,
                max_zoom: 20,
                loader_workers: 2,
            },
            Self::LowMemory => EngineConfig {
                pool_retain_chunks: 100,
                style_cache_capacity: 128,
                tile_cache_limit: 60,
                max_zoom: 18,
                loader_workers: 1,
            },
            Self::HighQuality => EngineConfig {
                pool_retain_chunks: 2000,
                style_cache_capacity: 1024,
                tile_cache_limit: 600,
                max_zoom: 22,
                loader_workers: 4,
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of geometry chunks the pool keeps for reuse. Chunks
    /// released beyond the limit are freed instead of pooled.
    pub pool_retain_chunks: usize,
    /// Matching cache entries kept per geometry kind
    pub style_cache_capacity: usize,
    /// Live tiles kept before distant unlocked tiles are evicted
    pub tile_cache_limit: usize,
    /// Deepest zoom level tiles are requested at
    pub max_zoom: u8,
    /// Worker threads converting decoded tiles into buffers
    pub loader_workers: usize,
}

impl EngineConfig {
    /// Clamp fields to workable values. Zoom stays below the bitmask width,
    /// worker count stays at least one.
    pub fn sanitize(mut self) -> Self {
        self.max_zoom = self.max_zoom.min(MAX_ZOOM - 1);
        self.loader_workers = self.loader_workers.max(1);
        self.tile_cache_limit = self.tile_cache_limit.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineProfile::Balanced.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_resolve() {
        let balanced = EngineProfile::Balanced.resolve();
        let low = EngineProfile::LowMemory.resolve();
        assert!(low.pool_retain_chunks < balanced.pool_retain_chunks);
        assert!(low.style_cache_capacity < balanced.style_cache_capacity);
    }

    #[test]
    fn test_sanitize_clamps() {
        let config = EngineConfig {
            pool_retain_chunks: 10,
            style_cache_capacity: 16,
            tile_cache_limit: 0,
            max_zoom: 40,
            loader_workers: 0,
        }
        .sanitize();
        assert_eq!(config.max_zoom, MAX_ZOOM - 1);
        assert_eq!(config.loader_workers, 1);
        assert_eq!(config.tile_cache_limit, 1);
    }
}
