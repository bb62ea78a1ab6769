use std::fs;
use std::path::Path;

use dxftext_core::{
    feature::{FeatureProperties, PlacedPolygon, PolygonRings},
    geometry::{Point2, signed_area},
};
use glam::DVec2;
use serde::Serialize;
use tracing::debug;

use crate::{FeatureSaver, IoError};

/// GeoJSON（RFC 7946）输出。每个字符多边形写成一个 Feature，整体包装为 FeatureCollection。
#[derive(Debug, Clone, Copy)]
pub struct GeoJsonWriter {
    pretty: bool,
}

impl GeoJsonWriter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn with_pretty(pretty: bool) -> Self {
        Self { pretty }
    }

    /// 序列化为字符串；整份内容在内存中完成后才会落盘，不存在写一半的输出。
    pub fn to_string(&self, features: &[PlacedPolygon]) -> Result<String, IoError> {
        let collection = FeatureCollection {
            kind: "FeatureCollection",
            features: features.iter().map(Feature::from_polygon).collect(),
        };
        let serialized = if self.pretty {
            serde_json::to_string_pretty(&collection)?
        } else {
            serde_json::to_string(&collection)?
        };
        Ok(serialized)
    }
}

impl Default for GeoJsonWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSaver for GeoJsonWriter {
    fn save(&self, features: &[PlacedPolygon], path: &Path) -> Result<(), IoError> {
        let serialized = self.to_string(features)?;
        fs::write(path, serialized).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), count = features.len(), "GeoJSON 已写入");
        Ok(())
    }
}

#[derive(Serialize)]
struct FeatureCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature<'a>>,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: &'a FeatureProperties,
}

type Ring = Vec<[f64; 2]>;

#[derive(Serialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl<'a> Feature<'a> {
    fn from_polygon(polygon: &'a PlacedPolygon) -> Self {
        let mut parts: Vec<Vec<Ring>> = polygon.parts.iter().map(oriented_rings).collect();
        let geometry = if parts.len() == 1 {
            Geometry::Polygon(parts.remove(0))
        } else {
            Geometry::MultiPolygon(parts)
        };
        Self {
            kind: "Feature",
            geometry,
            properties: &polygon.properties,
        }
    }
}

/// RFC 7946 要求外环逆时针、内环顺时针。
fn oriented_rings(part: &PolygonRings) -> Vec<Ring> {
    let mut rings = Vec::with_capacity(1 + part.holes.len());
    rings.push(orient(&part.exterior, true));
    for hole in &part.holes {
        rings.push(orient(hole, false));
    }
    rings
}

fn orient(ring: &[Point2], counter_clockwise: bool) -> Ring {
    let points: Vec<DVec2> = ring.iter().map(|p| p.as_vec2()).collect();
    let is_ccw = signed_area(&points) > 0.0;
    let mut coords: Ring = ring.iter().map(|p| p.to_array()).collect();
    if is_ccw != counter_clockwise {
        coords.reverse();
    }
    coords
}
