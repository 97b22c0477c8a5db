//! Collaborator seams: tile decoding and geometry tessellation
//!
//! Fetching and wire decoding happen upstream; the loader consumes already
//! decoded features. Join geometry math likewise lives behind a trait, the
//! core only dictates how its output lands in pooled buffers.

use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};

use crate::core::geo::TileCoord;
use crate::pool::{Vertex, VertexBuffer};
use crate::style::{GeometryKind, Style, Tag};
use crate::{Error, Result};

/// One decoded map feature: geometry class, attributes and a coordinate
/// sequence in tile-local units
#[derive(Debug, Clone)]
pub struct Feature {
    pub kind: GeometryKind,
    pub tags: Vec<Tag>,
    pub points: Vec<[f32; 2]>,
}

impl Feature {
    pub fn new(kind: GeometryKind, tags: Vec<Tag>, points: Vec<[f32; 2]>) -> Self {
        Self { kind, tags, points }
    }
}

pub type FeatureStream<'a> = Box<dyn Iterator<Item = Feature> + Send + 'a>;

/// Produces the decoded features of a tile. Implementations sit on top of
/// whatever fetch/decode pipeline the application uses.
pub trait TileSource: Send + Sync {
    fn decode(&self, coord: TileCoord) -> Result<FeatureStream<'_>>;
}

/// Turns one feature under one style into vertices. The default writes
/// plain strips; real line/polygon join math plugs in here.
pub trait Tessellator: Send + Sync {
    fn tessellate(&self, feature: &Feature, style: &Style, out: &mut VertexBuffer);
}

/// Minimal tessellator: points one vertex each, lines as segment pairs,
/// filled polygons as a triangle fan around the first point.
#[derive(Debug, Default)]
pub struct StripTessellator;

impl Tessellator for StripTessellator {
    fn tessellate(&self, feature: &Feature, style: &Style, out: &mut VertexBuffer) {
        let points = &feature.points;
        match feature.kind {
            GeometryKind::Point => {
                for p in points {
                    out.push(Vertex::from_f32(p[0], p[1]));
                }
            }
            GeometryKind::Line => {
                for pair in points.windows(2) {
                    out.push(Vertex::from_f32(pair[0][0], pair[0][1]));
                    out.push(Vertex::from_f32(pair[1][0], pair[1][1]));
                }
            }
            GeometryKind::Polygon => {
                if !style.fill || points.len() < 3 {
                    // outline only
                    for pair in points.windows(2) {
                        out.push(Vertex::from_f32(pair[0][0], pair[0][1]));
                        out.push(Vertex::from_f32(pair[1][0], pair[1][1]));
                    }
                    return;
                }
                let first = points[0];
                for pair in points[1..].windows(2) {
                    out.push(Vertex::from_f32(first[0], first[1]));
                    out.push(Vertex::from_f32(pair[0][0], pair[0][1]));
                    out.push(Vertex::from_f32(pair[1][0], pair[1][1]));
                }
            }
        }
    }
}

/// In-memory source for tests and demos
#[derive(Debug, Default)]
pub struct StaticSource {
    tiles: FxHashMap<TileCoord, Vec<Feature>>,
    failing: FxHashSet<TileCoord>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: TileCoord, features: Vec<Feature>) {
        self.tiles.insert(coord, features);
    }

    /// Make decoding this tile fail, for exercising retry paths
    pub fn fail(&mut self, coord: TileCoord) {
        self.failing.insert(coord);
    }
}

impl TileSource for StaticSource {
    fn decode(&self, coord: TileCoord) -> Result<FeatureStream<'_>> {
        if self.failing.contains(&coord) {
            return Err(Error::Decode(format!("no data for {coord}")));
        }
        let features = self.tiles.get(&coord).cloned().unwrap_or_default();
        Ok(Box::new(features.into_iter()))
    }
}
