use serde::{Deserialize, Serialize};

/// Number of zoom levels the tile pyramid supports. The tile grid doubles
/// per level and style zoom masks carry one bit per level, so 32 is the
/// ceiling for both.
pub const MAX_ZOOM: u8 = 32;

/// A tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Checks that x and y fit the grid of this zoom level
    pub fn is_valid(&self) -> bool {
        if self.z >= MAX_ZOOM {
            return false;
        }
        let max_coord = 1u64 << self.z;
        (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }

    /// Gets the parent tile at the next lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Gets the child tile in the given quadrant (0..4) one zoom level down
    pub fn child(&self, quadrant: u8) -> TileCoord {
        TileCoord::new(
            self.x * 2 + (quadrant as u32 & 1),
            self.y * 2 + (quadrant as u32 >> 1),
            self.z + 1,
        )
    }

    /// Quadrant of this tile within its parent: bit 0 from x, bit 1 from y.
    pub fn quadrant(&self) -> u8 {
        ((self.x & 1) | ((self.y & 1) << 1)) as u8
    }

    /// Quadrant taken at `level` steps above the leaf, used when descending
    /// from the root: level `z - 1` picks the topmost branch, level 0 the
    /// leaf's own quadrant.
    pub fn quadrant_at(&self, level: u8) -> u8 {
        (((self.x >> level) & 1) | (((self.y >> level) & 1) << 1)) as u8
    }

    /// Center of the tile in normalized map coordinates, [0, 1) per axis
    pub fn center(&self) -> (f64, f64) {
        let n = (1u64 << self.z) as f64;
        (
            (self.x as f64 + 0.5) / n,
            (self.y as f64 + 0.5) / n,
        )
    }

    /// Distance from a normalized map position, scaled so that one unit is
    /// one tile side at this zoom level. Used to order load jobs and to pick
    /// eviction victims.
    pub fn distance_to(&self, pos: (f64, f64)) -> f32 {
        let n = (1u64 << self.z) as f64;
        let (cx, cy) = self.center();
        let dx = (cx - pos.0) * n;
        let dy = (cy - pos.1) * n;
        ((dx * dx + dy * dy).sqrt()) as f32
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
