//! View-frustum culling volumes in double precision.
//!
//! Planes are extracted from a view-projection matrix with the
//! Griggs-Hartmann method and tested against bounding spheres, yielding a
//! three-way answer so callers can tell partially visible tiles apart from
//! fully visible ones.

use glam::{DMat4, DVec3, DVec4};

use crate::BoundingSphere;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Result of testing a volume against a plane or a set of planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intersect {
    /// Entirely on the negative side.
    Outside,
    /// Straddles at least one plane.
    Intersecting,
    /// Entirely on the positive side of every plane.
    Inside,
}

/// A symmetric perspective frustum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveFrustum {
    /// Vertical field of view in radians.
    pub fovy: f64,
    /// Viewport width divided by height.
    pub aspect_ratio: f64,
    /// Near plane distance in meters.
    pub near: f64,
    /// Far plane distance in meters.
    pub far: f64,
}

impl PerspectiveFrustum {
    /// Denominator of the screen-space error projection: `2 tan(fovy / 2)`.
    pub fn sse_denominator(&self) -> f64 {
        2.0 * (0.5 * self.fovy).tan()
    }

    /// Right-handed projection with a `[0, 1]` depth range.
    pub fn projection_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fovy, self.aspect_ratio, self.near, self.far)
    }
}

impl Default for PerspectiveFrustum {
    fn default() -> Self {
        Self {
            fovy: 60f64.to_radians(),
            aspect_ratio: 1.0,
            near: 1.0,
            far: 5.0e8,
        }
    }
}

/// Six inward-facing planes bounding the visible region.
#[derive(Clone, Debug)]
pub struct CullingVolume {
    /// Left, right, bottom, top, near, far. Each `(a, b, c, d)` has a unit
    /// normal `(a, b, c)` pointing into the volume.
    planes: [DVec4; 6],
}

impl CullingVolume {
    /// Extract planes from a combined view-projection matrix whose clip
    /// space depth runs from 0 (near) to 1 (far).
    pub fn from_view_projection(view_projection: &DMat4) -> Self {
        let rows = [
            view_projection.row(0),
            view_projection.row(1),
            view_projection.row(2),
            view_projection.row(3),
        ];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Build the volume for a camera at `position` looking along `direction`.
    pub fn from_camera(
        frustum: &PerspectiveFrustum,
        position: DVec3,
        direction: DVec3,
        up: DVec3,
    ) -> Self {
        let view = DMat4::look_to_rh(position, direction, up);
        Self::from_view_projection(&(frustum.projection_matrix() * view))
    }

    /// Classify a bounding sphere against all six planes.
    pub fn compute_visibility(&self, sphere: &BoundingSphere) -> Intersect {
        let mut intersecting = false;
        for plane in &self.planes {
            let distance = plane.truncate().dot(sphere.center) + plane.w;
            if distance < -sphere.radius {
                return Intersect::Outside;
            }
            if distance < sphere.radius {
                intersecting = true;
            }
        }
        if intersecting {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }
}
