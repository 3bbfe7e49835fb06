//! Collections of clipping polygons on the ellipsoid surface.
//!
//! Polygons are tested in longitude/latitude against a tile's rectangle.
//! Polygons crossing the antimeridian are not supported.

use std::sync::{Arc, Mutex};

use strata_geo::{Cartographic, Ellipsoid, Intersect, Rectangle};

use super::{SurfaceId, claim, lock, release};
use crate::error::ConfigurationError;

/// A closed polygon given by its vertices in order.
#[derive(Clone, Debug, PartialEq)]
pub struct ClippingPolygon {
    positions: Vec<Cartographic>,
    ellipsoid: Ellipsoid,
}

impl ClippingPolygon {
    pub fn new(positions: Vec<Cartographic>, ellipsoid: Ellipsoid) -> Result<Self, ConfigurationError> {
        if positions.len() < 3 {
            return Err(ConfigurationError::InvalidOption(format!(
                "clipping polygon needs at least 3 positions, got {}",
                positions.len()
            )));
        }
        Ok(Self { positions, ellipsoid })
    }

    /// Build from `(longitude, latitude)` pairs in degrees on WGS84.
    pub fn from_degrees(coordinates: &[(f64, f64)]) -> Result<Self, ConfigurationError> {
        let positions = coordinates
            .iter()
            .map(|&(longitude, latitude)| Cartographic::from_degrees(longitude, latitude, 0.0))
            .collect();
        Self::new(positions, Ellipsoid::WGS84)
    }

    pub fn positions(&self) -> &[Cartographic] {
        &self.positions
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Bounding rectangle of the vertices.
    pub fn rectangle(&self) -> Rectangle {
        let mut rectangle = Rectangle::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for position in &self.positions {
            rectangle.west = rectangle.west.min(position.longitude);
            rectangle.east = rectangle.east.max(position.longitude);
            rectangle.south = rectangle.south.min(position.latitude);
            rectangle.north = rectangle.north.max(position.latitude);
        }
        rectangle
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let count = self.positions.len();
        (0..count).map(move |i| {
            let a = &self.positions[i];
            let b = &self.positions[(i + 1) % count];
            ((a.longitude, a.latitude), (b.longitude, b.latitude))
        })
    }

    /// Even-odd point containment.
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        let mut inside = false;
        for ((x0, y0), (x1, y1)) in self.edges() {
            if (y0 > latitude) != (y1 > latitude) {
                let crossing = x0 + (latitude - y0) / (y1 - y0) * (x1 - x0);
                if longitude < crossing {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Classify a rectangle against the polygon: `Inside` when the polygon
    /// covers it entirely, `Outside` when they are disjoint.
    pub fn intersect_rectangle(&self, rectangle: &Rectangle) -> Intersect {
        let corners = [
            (rectangle.west, rectangle.south),
            (rectangle.east, rectangle.south),
            (rectangle.east, rectangle.north),
            (rectangle.west, rectangle.north),
        ];
        let rectangle_edges = [
            (corners[0], corners[1]),
            (corners[1], corners[2]),
            (corners[2], corners[3]),
            (corners[3], corners[0]),
        ];
        for (a, b) in self.edges() {
            if rectangle_edges
                .iter()
                .any(|&(c, d)| segments_intersect(a, b, c, d))
            {
                return Intersect::Intersecting;
            }
        }

        // No boundary crossings: one shape contains the other, or they are
        // disjoint.
        if self.positions.iter().any(|position| rectangle.contains(position)) {
            return Intersect::Intersecting;
        }
        let center = rectangle.center();
        if self.contains(center.longitude, center.latitude) {
            return Intersect::Inside;
        }
        Intersect::Outside
    }
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn segments_intersect(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

#[derive(Debug)]
struct PolygonSet {
    polygons: Vec<ClippingPolygon>,
    inverse: bool,
    enabled: bool,
    owner: Option<SurfaceId>,
    version: u64,
}

/// Polygons whose interior is clipped away, or with `inverse` set, the only
/// regions kept.
#[derive(Clone, Debug)]
pub struct ClippingPolygonCollection {
    inner: Arc<Mutex<PolygonSet>>,
}

impl ClippingPolygonCollection {
    pub fn new(polygons: Vec<ClippingPolygon>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PolygonSet {
                polygons,
                inverse: false,
                enabled: true,
                owner: None,
                version: 0,
            })),
        }
    }

    fn edit(&self, change: impl FnOnce(&mut PolygonSet)) {
        let mut set = lock(&self.inner);
        change(&mut set);
        set.version += 1;
    }

    pub fn add(&self, polygon: ClippingPolygon) {
        self.edit(|set| set.polygons.push(polygon));
    }

    pub fn clear(&self) {
        self.edit(|set| set.polygons.clear());
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_inverse(&self, inverse: bool) {
        self.edit(|set| set.inverse = inverse);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.edit(|set| set.enabled = enabled);
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner).owner.is_some()
    }

    pub fn same_collection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Claim the collection for a surface on `ellipsoid`. Every polygon must
    /// be defined on the same ellipsoid.
    pub(crate) fn attach(&self, surface: SurfaceId, ellipsoid: &Ellipsoid) -> Result<(), ConfigurationError> {
        let mut set = lock(&self.inner);
        if let Some(polygon) = set.polygons.iter().find(|polygon| polygon.ellipsoid() != ellipsoid) {
            return Err(ConfigurationError::IncompatibleClippingTarget(format!(
                "polygon ellipsoid radii {:?} differ from the surface's {:?}",
                polygon.ellipsoid().radii(),
                ellipsoid.radii()
            )));
        }
        claim(&mut set.owner, surface)
    }

    pub(crate) fn detach(&self, surface: SurfaceId) {
        release(&mut lock(&self.inner).owner, surface);
    }

    pub fn snapshot(&self) -> PolygonSnapshot {
        let set = lock(&self.inner);
        PolygonSnapshot {
            polygons: set.polygons.clone(),
            inverse: set.inverse,
            enabled: set.enabled,
            version: set.version,
        }
    }
}

/// An immutable copy of a polygon collection.
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonSnapshot {
    pub polygons: Vec<ClippingPolygon>,
    pub inverse: bool,
    pub enabled: bool,
    pub(crate) version: u64,
}

impl PolygonSnapshot {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.polygons.is_empty()
    }

    /// Strongest relation between the rectangle and any polygon:
    /// `Inside` beats `Intersecting` beats `Outside`.
    pub fn intersect(&self, rectangle: &Rectangle) -> Intersect {
        let mut result = Intersect::Outside;
        for polygon in &self.polygons {
            match polygon.intersect_rectangle(rectangle) {
                Intersect::Inside => return Intersect::Inside,
                Intersect::Intersecting => result = Intersect::Intersecting,
                Intersect::Outside => {}
            }
        }
        result
    }

    /// Vertex coordinates packed as `(longitude, latitude)` pairs.
    pub fn packed_positions(&self) -> Vec<f32> {
        self.polygons
            .iter()
            .flat_map(|polygon| polygon.positions())
            .flat_map(|position| [position.longitude as f32, position.latitude as f32])
            .collect()
    }

    /// Bounding rectangle of each polygon, packed as `(w, s, e, n)`.
    pub fn packed_extents(&self) -> Vec<f32> {
        self.polygons
            .iter()
            .flat_map(|polygon| {
                let rectangle = polygon.rectangle();
                [
                    rectangle.west as f32,
                    rectangle.south as f32,
                    rectangle.east as f32,
                    rectangle.north as f32,
                ]
            })
            .collect()
    }
}
