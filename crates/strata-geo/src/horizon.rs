//! Horizon occlusion against the ellipsoid.
//!
//! The ellipsoid is approximated by its inscribed sphere, so anything the
//! test rejects is below the horizon of the real surface too.

use glam::DVec3;

/// Horizon test state for one camera position.
#[derive(Clone, Debug)]
pub struct HorizonOccluder {
    camera_position: DVec3,
    radius: f64,
    camera_distance: f64,
    /// Cosine of the angle, seen from the center, between the camera and
    /// the horizon circle.
    cos_horizon: f64,
    sin_horizon: f64,
}

impl HorizonOccluder {
    /// Occluder for a camera at `camera_position` above a sphere of
    /// `radius` centered at the origin.
    pub fn new(camera_position: DVec3, radius: f64) -> Self {
        let camera_distance = camera_position.length();
        let cos_horizon = if camera_distance > radius {
            radius / camera_distance
        } else {
            0.0
        };
        let sin_horizon = (1.0 - cos_horizon * cos_horizon).max(0.0).sqrt();
        Self {
            camera_position,
            radius,
            camera_distance,
            cos_horizon,
            sin_horizon,
        }
    }

    /// Returns `true` if a sphere might be visible above the horizon.
    pub fn is_visible(&self, center: DVec3, radius: f64) -> bool {
        if self.camera_distance <= self.radius {
            return true;
        }
        let center_distance = center.length();
        if center_distance <= radius || center_distance < 1e-10 {
            return true;
        }

        let cos_angle = center.dot(self.camera_position) / (center_distance * self.camera_distance);

        let sin_margin = radius / center_distance;
        let cos_margin = (1.0 - sin_margin * sin_margin).max(0.0).sqrt();
        // Visible while the angle stays below horizon + margin.
        let cos_threshold = self.cos_horizon * cos_margin - self.sin_horizon * sin_margin;

        cos_angle >= cos_threshold
    }

    /// Straight-line distance from the camera to the horizon.
    pub fn horizon_distance(&self) -> f64 {
        if self.camera_distance <= self.radius {
            return 0.0;
        }
        (self.camera_distance * self.camera_distance - self.radius * self.radius).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f64 = 6_356_752.0;

    fn occluder(altitude: f64) -> HorizonOccluder {
        HorizonOccluder::new(DVec3::new(0.0, 0.0, RADIUS + altitude), RADIUS)
    }

    #[test]
    fn test_point_below_camera_is_visible() {
        assert!(occluder(1000.0).is_visible(DVec3::new(0.0, 0.0, RADIUS), 100.0));
    }

    #[test]
    fn test_far_side_is_occluded() {
        assert!(!occluder(1000.0).is_visible(DVec3::new(0.0, 0.0, -RADIUS), 100.0));
    }

    #[test]
    fn test_large_sphere_around_center_is_never_occluded() {
        assert!(occluder(1000.0).is_visible(DVec3::new(0.0, 0.0, -1000.0), 5_000.0));
    }

    #[test]
    fn test_horizon_grows_with_altitude() {
        assert!(occluder(10_000.0).horizon_distance() > occluder(100.0).horizon_distance());
    }

    #[test]
    fn test_camera_inside_sees_everything() {
        let inside = HorizonOccluder::new(DVec3::new(0.0, 0.0, 10.0), RADIUS);
        assert!(inside.is_visible(DVec3::new(0.0, 0.0, -RADIUS), 1.0));
    }
}
