//! Bounding spheres and planes in Earth-centered coordinates.

use glam::{DMat4, DVec3, DVec4};

use crate::{Cartographic, Ellipsoid, Intersect, Rectangle};

/// Samples per rectangle edge when fitting a sphere around a tile.
const RECTANGLE_SAMPLES: usize = 9;

/// A bounding sphere in Earth-centered, Earth-fixed coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: DVec3,
    /// Radius of the sphere.
    pub radius: f64,
}

impl BoundingSphere {
    pub const fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest axis-aligned-box-centered sphere containing every point.
    pub fn from_points(points: &[DVec3]) -> Self {
        let Some(first) = points.first() else {
            return Self::new(DVec3::ZERO, 0.0);
        };
        let (mut min, mut max) = (*first, *first);
        for point in points {
            min = min.min(*point);
            max = max.max(*point);
        }
        let center = (min + max) * 0.5;
        let radius_sq = points
            .iter()
            .map(|p| (*p - center).length_squared())
            .fold(0.0_f64, f64::max);
        Self::new(center, radius_sq.sqrt())
    }

    /// Compute a sphere enclosing the surface patch covered by `rectangle`
    /// between `min_height` and `max_height`.
    ///
    /// The patch is sampled on a regular grid at both heights; the center is
    /// the middle of the samples' bounding box.
    pub fn from_rectangle(
        rectangle: &Rectangle,
        ellipsoid: &Ellipsoid,
        min_height: f64,
        max_height: f64,
    ) -> Self {
        let width = rectangle.width();
        let height = rectangle.height();
        let steps = (RECTANGLE_SAMPLES - 1) as f64;

        let mut points = Vec::with_capacity(RECTANGLE_SAMPLES * RECTANGLE_SAMPLES * 2);
        for row in 0..RECTANGLE_SAMPLES {
            let latitude = rectangle.south + height * row as f64 / steps;
            for column in 0..RECTANGLE_SAMPLES {
                let longitude = rectangle.west + width * column as f64 / steps;
                for h in [min_height, max_height] {
                    let position = Cartographic::new(longitude, latitude, h);
                    points.push(ellipsoid.cartographic_to_cartesian(&position));
                }
            }
        }

        let mut sphere = Self::from_points(&points);
        // Great-circle arcs between samples bulge past the sampled chords.
        let bulge = ellipsoid.maximum_radius() * (1.0 - (width.max(height) / (2.0 * steps)).cos());
        sphere.radius += bulge;
        sphere
    }

    /// Distance from `point` to the sphere surface, zero when inside.
    pub fn distance_to(&self, point: DVec3) -> f64 {
        ((point - self.center).length() - self.radius).max(0.0)
    }

    /// Classify the sphere against a plane. `Inside` means on the side the
    /// normal points to.
    pub fn intersect_plane(&self, plane: &Plane) -> Intersect {
        let distance = plane.signed_distance(self.center);
        if distance < -self.radius {
            Intersect::Outside
        } else if distance < self.radius {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }
}

/// A plane in Hessian normal form: `normal · p + distance = 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: DVec3,
    /// Signed distance from the origin along the normal.
    pub distance: f64,
}

impl Plane {
    pub const fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// The plane through `point` with the given unit normal.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Self::new(normal, -normal.dot(point))
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    /// Apply an affine transform, renormalizing the result.
    pub fn transform(&self, matrix: &DMat4) -> Self {
        let inverse_transpose = matrix.inverse().transpose();
        let transformed = inverse_transpose * DVec4::new(
            self.normal.x,
            self.normal.y,
            self.normal.z,
            self.distance,
        );
        let length = transformed.truncate().length();
        if length == 0.0 {
            return *self;
        }
        let normalized = transformed / length;
        Self::new(normalized.truncate(), normalized.w)
    }

    /// Pack as `(nx, ny, nz, d)`.
    pub fn to_vec4(&self) -> DVec4 {
        self.normal.extend(self.distance)
    }
}
