//! Reference ellipsoids and geodetic conversions.

use glam::DVec3;

use crate::Cartographic;

/// A triaxial ellipsoid centered at the origin, described by its radii.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    radii: DVec3,
    radii_squared: DVec3,
    one_over_radii: DVec3,
}

impl Ellipsoid {
    /// The WGS84 ellipsoid, in meters.
    pub const WGS84: Ellipsoid = Ellipsoid::from_radii(6_378_137.0, 6_378_137.0, 6_356_752.314_245_179);

    /// A unit sphere.
    pub const UNIT_SPHERE: Ellipsoid = Ellipsoid::from_radii(1.0, 1.0, 1.0);

    /// Build an ellipsoid from its three radii.
    pub const fn from_radii(x: f64, y: f64, z: f64) -> Self {
        Self {
            radii: DVec3::new(x, y, z),
            radii_squared: DVec3::new(x * x, y * y, z * z),
            one_over_radii: DVec3::new(1.0 / x, 1.0 / y, 1.0 / z),
        }
    }

    /// A sphere of the given radius.
    pub const fn sphere(radius: f64) -> Self {
        Self::from_radii(radius, radius, radius)
    }

    pub fn radii(&self) -> DVec3 {
        self.radii
    }

    pub fn maximum_radius(&self) -> f64 {
        self.radii.max_element()
    }

    pub fn minimum_radius(&self) -> f64 {
        self.radii.min_element()
    }

    /// Unit normal of the surface at the given longitude and latitude.
    pub fn geodetic_surface_normal_cartographic(&self, position: &Cartographic) -> DVec3 {
        let cos_latitude = position.latitude.cos();
        DVec3::new(
            cos_latitude * position.longitude.cos(),
            cos_latitude * position.longitude.sin(),
            position.latitude.sin(),
        )
        .normalize()
    }

    /// Unit normal of the surface beneath a Cartesian point.
    pub fn geodetic_surface_normal(&self, position: DVec3) -> DVec3 {
        (position * self.one_over_radii * self.one_over_radii).normalize_or_zero()
    }

    /// Convert a geodetic position to Earth-centered Cartesian coordinates.
    pub fn cartographic_to_cartesian(&self, position: &Cartographic) -> DVec3 {
        let normal = self.geodetic_surface_normal_cartographic(position);
        let k = self.radii_squared * normal;
        let gamma = normal.dot(k).sqrt();
        k / gamma + normal * position.height
    }

    /// Project a Cartesian point onto the surface along the ray through the
    /// ellipsoid center.
    pub fn scale_to_geocentric_surface(&self, position: DVec3) -> DVec3 {
        let scaled = position * self.one_over_radii;
        let length = scaled.length();
        if length == 0.0 {
            return DVec3::ZERO;
        }
        position / length
    }

    /// Approximate height of a Cartesian point above the surface, measured
    /// along the geocentric ray. Exact for spheres.
    pub fn geocentric_height(&self, position: DVec3) -> f64 {
        let surface = self.scale_to_geocentric_surface(position);
        let height = (position - surface).length();
        if position.length_squared() < surface.length_squared() {
            -height
        } else {
            height
        }
    }

    /// Convert an Earth-centered Cartesian point back to geodetic
    /// longitude and latitude, using the geocentric height approximation.
    pub fn cartesian_to_cartographic(&self, position: DVec3) -> Cartographic {
        let normal = self.geodetic_surface_normal(position);
        Cartographic::new(
            normal.y.atan2(normal.x),
            normal.z.clamp(-1.0, 1.0).asin(),
            self.geocentric_height(position),
        )
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}
