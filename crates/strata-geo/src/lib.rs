//! Geodetic primitives for quadtree terrain: ellipsoids, cartographic
//! rectangles, tiling schemes, and the culling volumes tiles are tested against.

mod angle;
mod bounds;
mod cartographic;
mod culling;
mod ellipsoid;
mod horizon;
mod rectangle;
mod tiling;

pub use angle::{EPSILON7, EPSILON14, TWO_PI, equals_epsilon, negative_pi_to_pi, zero_to_two_pi};
pub use bounds::{BoundingSphere, Plane};
pub use cartographic::Cartographic;
pub use culling::{CullingVolume, Intersect, PerspectiveFrustum};
pub use ellipsoid::Ellipsoid;
pub use horizon::HorizonOccluder;
pub use rectangle::Rectangle;
pub use tiling::{TileKey, TilingScheme};
