//! Vector data structures: the analysis [`Region`] and bounding boxes.

use crate::error::{Error, Result};
use geo::{Area, BoundingRect, Centroid, Contains, Coord, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Inclusive containment test
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// As a STAC-style `[west, south, east, north]` array
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// The field boundary under analysis.
///
/// A single simple polygon in WGS84 longitude/latitude. Construction
/// validates the invariants; a `Region` is never mutated afterwards.
/// Interior rings are dropped: only the exterior boundary is analysed.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygon: Polygon<f64>,
    bbox: BBox,
}

impl Region {
    /// Build a region from a polygon in lon/lat degrees.
    ///
    /// Fails when the exterior has fewer than three distinct vertices, zero
    /// area, a self-intersection, or a vertex outside lon ∈ [-180, 180],
    /// lat ∈ [-90, 90].
    pub fn new(polygon: Polygon<f64>) -> Result<Self> {
        let mut coords: Vec<Coord<f64>> = polygon.exterior().0.clone();

        for c in &coords {
            if !c.x.is_finite() || !c.y.is_finite() {
                return Err(Error::InvalidGeometry("non-finite vertex".into()));
            }
            if !(-180.0..=180.0).contains(&c.x) || !(-90.0..=90.0).contains(&c.y) {
                return Err(Error::InvalidGeometry(format!(
                    "vertex ({}, {}) is outside longitude/latitude bounds",
                    c.x, c.y
                )));
            }
        }

        // Drop repeated consecutive vertices, then close the ring.
        coords.dedup();
        if coords.len() > 1 && coords.first() == coords.last() {
            coords.pop();
        }
        if coords.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon needs at least 3 distinct vertices, found {}",
                coords.len()
            )));
        }
        if has_self_intersection(&coords) {
            return Err(Error::InvalidGeometry("polygon boundary intersects itself".into()));
        }
        coords.push(coords[0]);

        let polygon = Polygon::new(LineString::new(coords), vec![]);
        if polygon.unsigned_area() <= 0.0 {
            return Err(Error::InvalidGeometry("polygon has zero area".into()));
        }

        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| Error::InvalidGeometry("empty polygon".into()))?;
        let bbox = BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);

        Ok(Self { polygon, bbox })
    }

    /// Convenience constructor from `(lon, lat)` pairs.
    pub fn from_lon_lat(vertices: &[(f64, f64)]) -> Result<Self> {
        let ring: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
        Self::new(Polygon::new(LineString::new(ring), vec![]))
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Closed exterior ring vertices
    pub fn exterior(&self) -> &[Coord<f64>] {
        &self.polygon.exterior().0
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Whether `(x, y)` lies strictly inside the polygon
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.contains(&Point::new(x, y))
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.polygon
            .centroid()
            .map(|p| (p.x(), p.y()))
            .unwrap_or_else(|| self.bbox.center())
    }

    /// GeoJSON `Polygon` geometry object
    pub fn to_geojson(&self) -> serde_json::Value {
        let ring: Vec<[f64; 2]> = self.exterior().iter().map(|c| [c.x, c.y]).collect();
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [ring],
        })
    }
}

/// Pairwise check of non-adjacent edges of an open ring.
fn has_self_intersection(ring: &[Coord<f64>]) -> bool {
    let n = ring.len();
    let edge = |i: usize| (ring[i], ring[(i + 1) % n]);

    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent edges share a vertex by construction.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a1, a2) = edge(i);
            let (b1, b2) = edge(j);
            if segments_intersect(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

fn orientation(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> f64 {
    (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
}

fn on_segment(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> bool {
    r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
}

fn segments_intersect(a1: Coord<f64>, a2: Coord<f64>, b1: Coord<f64>, b2: Coord<f64>) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}
