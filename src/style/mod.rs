//! Feature styling: tags, resolved styles and the rule-tree seam
//!
//! Parsing rule definitions into a rule tree happens elsewhere; this module
//! only defines the matching contract and the types flowing through the
//! matching cache.

pub mod cache;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::geo::MAX_ZOOM;
use crate::{Error, Result};

/// Geometry class of a map feature. Each kind gets its own matching cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Self::Point => 0,
            Self::Line => 1,
            Self::Polygon => 2,
        }
    }
}

/// One key/value attribute of a map feature, e.g. highway=residential
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Canonical, order-independent identity of a tag set. Two features whose
/// tags differ only in ordering share one signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSignature(Box<[Tag]>);

impl TagSignature {
    pub fn canonical(tags: &[Tag]) -> Self {
        let mut sorted = tags.to_vec();
        sorted.sort();
        Self(sorted.into_boxed_slice())
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }
}

/// A resolved drawing instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Drawing order layer, lower levels draw first
    pub level: u8,
    /// 0xAARRGGBB
    pub color: u32,
    /// Stroke width in tile-local units
    pub width: f32,
    /// Filled polygon rather than an outline
    pub fill: bool,
}

impl Style {
    pub fn line(level: u8, color: u32, width: f32) -> Arc<Self> {
        Arc::new(Self {
            level,
            color,
            width,
            fill: false,
        })
    }

    pub fn area(level: u8, color: u32) -> Arc<Self> {
        Arc::new(Self {
            level,
            color,
            width: 0.0,
            fill: true,
        })
    }

    /// Stable identity of the visual parameters, used to bucket geometry
    /// layers within a tile
    pub fn layer_key(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = fxhash::FxHasher::default();
        self.color.hash(&mut hasher);
        self.width.to_bits().hash(&mut hasher);
        self.fill.hash(&mut hasher);
        hasher.finish()
    }
}

/// Ordered list of styles matched for one (tag set, zoom) query. Shared
/// between the cache and every tile conversion that resolved it.
pub type StyleList = Arc<[Arc<Style>]>;

/// Rule-tree collaborator. Walks its rules and collects every style that
/// matches the tag set under the given zoom mask, in rule declaration
/// order. Invoked only on a matching-cache miss.
pub trait RuleTree: Send + Sync {
    fn match_styles(
        &self,
        kind: GeometryKind,
        tags: &[Tag],
        zoom_mask: u32,
        out: &mut Vec<Arc<Style>>,
    );
}

/// Bit for a zoom level in a style zoom mask. Levels at or beyond the mask
/// width are an error, never a silent truncation.
pub fn zoom_mask(zoom: u8) -> Result<u32> {
    if zoom >= MAX_ZOOM {
        return Err(Error::ZoomOutOfRange(zoom));
    }
    Ok(1u32 << zoom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_order_independent() {
        let a = [Tag::new("highway", "residential"), Tag::new("oneway", "yes")];
        let b = [Tag::new("oneway", "yes"), Tag::new("highway", "residential")];
        assert_eq!(TagSignature::canonical(&a), TagSignature::canonical(&b));
    }

    #[test]
    fn test_zoom_mask_bounds() {
        assert_eq!(zoom_mask(0).unwrap(), 1);
        assert_eq!(zoom_mask(14).unwrap(), 1 << 14);
        assert_eq!(zoom_mask(31).unwrap(), 1 << 31);
        assert!(matches!(zoom_mask(32), Err(Error::ZoomOutOfRange(32))));
    }

    #[test]
    fn test_layer_key_tracks_visuals() {
        let a = Style::line(1, 0xff00ff00, 2.0);
        let b = Style::line(5, 0xff00ff00, 2.0);
        let c = Style::line(1, 0xff0000ff, 2.0);
        // level is not part of the visual key
        assert_eq!(a.layer_key(), b.layer_key());
        assert_ne!(a.layer_key(), c.layer_key());
    }
}
