//! Cartographic rectangles in radians.
//!
//! A rectangle whose `east` is less than its `west` crosses the
//! antimeridian. Width, center, containment and intersection all account
//! for that wrap.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::{Cartographic, EPSILON14, TWO_PI, equals_epsilon, negative_pi_to_pi};

/// A two-dimensional region of the ellipsoid surface, bounded by meridians
/// and parallels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    /// Westernmost longitude in radians, in `[-π, π]`.
    pub west: f64,
    /// Southernmost latitude in radians, in `[-π/2, π/2]`.
    pub south: f64,
    /// Easternmost longitude in radians, in `[-π, π]`.
    pub east: f64,
    /// Northernmost latitude in radians, in `[-π/2, π/2]`.
    pub north: f64,
}

impl Rectangle {
    /// The whole globe.
    pub const MAX_VALUE: Rectangle = Rectangle {
        west: -PI,
        south: -FRAC_PI_2,
        east: PI,
        north: FRAC_PI_2,
    };

    /// Create a rectangle from radians.
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Create a rectangle from degrees.
    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west: west.to_radians(),
            south: south.to_radians(),
            east: east.to_radians(),
            north: north.to_radians(),
        }
    }

    /// Longitudinal extent in radians, accounting for antimeridian wrap.
    #[must_use]
    pub fn width(&self) -> f64 {
        if self.east < self.west {
            self.east + TWO_PI - self.west
        } else {
            self.east - self.west
        }
    }

    /// Latitudinal extent in radians.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    #[must_use]
    pub fn center(&self) -> Cartographic {
        let mut east = self.east;
        if east < self.west {
            east += TWO_PI;
        }
        Cartographic::new(
            negative_pi_to_pi((self.west + east) * 0.5),
            (self.south + self.north) * 0.5,
            0.0,
        )
    }

    /// The four corners plus the center, in the order southwest, southeast,
    /// northwest, northeast, center.
    #[must_use]
    pub fn sample_points(&self) -> [Cartographic; 5] {
        [
            Cartographic::new(self.west, self.south, 0.0),
            Cartographic::new(self.east, self.south, 0.0),
            Cartographic::new(self.west, self.north, 0.0),
            Cartographic::new(self.east, self.north, 0.0),
            self.center(),
        ]
    }

    /// Returns `true` if `position` lies inside or on the edge of this rectangle.
    #[must_use]
    pub fn contains(&self, position: &Cartographic) -> bool {
        let mut longitude = position.longitude;
        let latitude = position.latitude;
        let west = self.west;
        let mut east = self.east;
        if east < west {
            east += TWO_PI;
            if longitude < 0.0 {
                longitude += TWO_PI;
            }
        }
        (longitude > west || equals_epsilon(longitude, west, EPSILON14))
            && (longitude < east || equals_epsilon(longitude, east, EPSILON14))
            && latitude >= self.south
            && latitude <= self.north
    }

    /// The overlap of two rectangles, or `None` when they are disjoint.
    ///
    /// Rectangles that only share an edge are considered disjoint. When the
    /// longitudinal overlap would split into two pieces (a wrapping rectangle
    /// against a non-full-globe one spanning both sides), the eastern piece
    /// of `self` is returned.
    #[must_use]
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        if south >= north {
            return None;
        }

        let self_width = self.width();
        let other_width = other.width();
        if other_width >= TWO_PI - EPSILON14 {
            return Some(Rectangle::new(self.west, south, self.east, north));
        }
        if self_width >= TWO_PI - EPSILON14 {
            return Some(Rectangle::new(other.west, south, other.east, north));
        }

        // Unwrap both ranges so east > west, then try the shifts that can
        // line the other range up with this one.
        let self_west = self.west;
        let self_east = self.west + self_width;
        for shift in [0.0, TWO_PI, -TWO_PI] {
            let other_west = other.west + shift;
            let other_east = other_west + other_width;
            let west = self_west.max(other_west);
            let east = self_east.min(other_east);
            if east > west {
                return Some(Rectangle::new(
                    negative_pi_to_pi(west),
                    south,
                    negative_pi_to_pi(east),
                    north,
                ));
            }
        }
        None
    }

    /// Returns `true` if the two rectangles overlap with non-zero area.
    #[must_use]
    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns `true` if `other` lies entirely within this rectangle.
    #[must_use]
    pub fn contains_rectangle(&self, other: &Rectangle) -> bool {
        match self.intersection(other) {
            Some(overlap) => {
                equals_epsilon(overlap.width(), other.width(), 1e-12)
                    && equals_epsilon(overlap.height(), other.height(), 1e-12)
            }
            None => false,
        }
    }
}

impl Default for Rectangle {
    fn default() -> Self {
        Self::MAX_VALUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_wraps_across_antimeridian() {
        let rect = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);
        assert!(equals_epsilon(rect.width(), 20f64.to_radians(), 1e-12));
    }

    #[test]
    fn test_center_of_wrapping_rectangle_is_on_antimeridian() {
        let rect = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);
        let center = rect.center();
        assert!(equals_epsilon(center.longitude.abs(), PI, 1e-12));
        assert!(equals_epsilon(center.latitude, 0.0, 1e-12));
    }

    #[test]
    fn test_contains_respects_wrap() {
        let rect = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);
        assert!(rect.contains(&Cartographic::from_degrees(175.0, 0.0, 0.0)));
        assert!(rect.contains(&Cartographic::from_degrees(-175.0, 0.0, 0.0)));
        assert!(!rect.contains(&Cartographic::from_degrees(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_intersection_of_overlapping_rectangles() {
        let a = Rectangle::from_degrees(0.0, 0.0, 20.0, 20.0);
        let b = Rectangle::from_degrees(10.0, 10.0, 30.0, 30.0);
        let overlap = a.intersection(&b).expect("rectangles overlap");
        let expected = Rectangle::from_degrees(10.0, 10.0, 20.0, 20.0);
        assert!(equals_epsilon(overlap.west, expected.west, 1e-12));
        assert!(equals_epsilon(overlap.north, expected.north, 1e-12));
    }

    #[test]
    fn test_edge_sharing_rectangles_are_disjoint() {
        let a = Rectangle::from_degrees(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::from_degrees(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_intersection_with_wrapping_rectangle() {
        let wrapping = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);

        let west_side = Rectangle::from_degrees(160.0, -5.0, 175.0, 5.0);
        let overlap = wrapping.intersection(&west_side).expect("overlap");
        assert!(equals_epsilon(overlap.west, 170f64.to_radians(), 1e-9));
        assert!(equals_epsilon(overlap.east, 175f64.to_radians(), 1e-9));

        let east_side = Rectangle::from_degrees(-175.0, -5.0, -160.0, 5.0);
        let overlap = wrapping.intersection(&east_side).expect("overlap");
        assert!(equals_epsilon(overlap.west, (-175f64).to_radians(), 1e-9));
        assert!(equals_epsilon(overlap.east, (-170f64).to_radians(), 1e-9));
    }

    #[test]
    fn test_intersection_with_whole_globe_keeps_wrap() {
        let wrapping = Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0);
        let overlap = Rectangle::MAX_VALUE.intersection(&wrapping).expect("overlap");
        assert_eq!(overlap.west, wrapping.west);
        assert_eq!(overlap.east, wrapping.east);
    }

    #[test]
    fn test_contains_rectangle() {
        let outer = Rectangle::MAX_VALUE;
        let inner = Rectangle::from_degrees(-10.0, -10.0, 10.0, 10.0);
        assert!(outer.contains_rectangle(&inner));
        assert!(!inner.contains_rectangle(&outer));
    }
}
