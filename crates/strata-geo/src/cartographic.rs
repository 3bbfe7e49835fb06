//! Geodetic positions.

/// A position given as longitude, latitude (radians) and height above the
/// ellipsoid (meters).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cartographic {
    /// Longitude in radians, east positive.
    pub longitude: f64,
    /// Latitude in radians, north positive.
    pub latitude: f64,
    /// Height above the ellipsoid surface in meters.
    pub height: f64,
}

impl Cartographic {
    /// Create a position from radians.
    pub const fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Create a position from degrees.
    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude.to_radians(),
            latitude: latitude.to_radians(),
            height,
        }
    }
}
