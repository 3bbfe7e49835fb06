//! Scripted camera descent toward a target on the globe.

use strata_config::ViewerConfig;
use strata_geo::{Cartographic, Ellipsoid, PerspectiveFrustum};
use strata_surface::{CameraState, FrameState};

/// A straight-down camera whose altitude falls geometrically from the start
/// altitude to the end altitude over a fixed number of frames.
#[derive(Clone, Debug)]
pub struct FlyIn {
    ellipsoid: Ellipsoid,
    longitude_deg: f64,
    latitude_deg: f64,
    start_altitude: f64,
    end_altitude: f64,
    frames: u64,
    frustum: PerspectiveFrustum,
    viewport: (u32, u32),
}

impl FlyIn {
    pub fn new(ellipsoid: Ellipsoid, config: &ViewerConfig) -> Self {
        let width = config.width.max(1);
        let height = config.height.max(1);
        let frustum = PerspectiveFrustum {
            fovy: config.fovy_degrees.clamp(1.0, 179.0).to_radians(),
            aspect_ratio: f64::from(width) / f64::from(height),
            ..PerspectiveFrustum::default()
        };
        Self {
            ellipsoid,
            longitude_deg: config.target_longitude_deg,
            latitude_deg: config.target_latitude_deg,
            start_altitude: config.start_altitude_m.max(1.0),
            end_altitude: config.end_altitude_m.max(1.0),
            frames: config.frames.max(1),
            frustum,
            viewport: (width, height),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Camera altitude for frame `index`, counting from 0.
    pub fn altitude(&self, index: u64) -> f64 {
        if self.frames == 1 {
            return self.start_altitude;
        }
        let t = index.min(self.frames - 1) as f64 / (self.frames - 1) as f64;
        self.start_altitude * (self.end_altitude / self.start_altitude).powf(t)
    }

    pub fn frame(&self, index: u64) -> FrameState {
        let target = Cartographic::from_degrees(self.longitude_deg, self.latitude_deg, self.altitude(index));
        let camera = CameraState::looking_down(&self.ellipsoid, &target, self.frustum);
        FrameState::new(index + 1, camera, self.viewport.0, self.viewport.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(frames: u64) -> FlyIn {
        let config = ViewerConfig {
            frames,
            start_altitude_m: 1.0e7,
            end_altitude_m: 1.0e3,
            ..ViewerConfig::default()
        };
        FlyIn::new(Ellipsoid::WGS84, &config)
    }

    #[test]
    fn test_altitude_endpoints() {
        let flight = flight(5);
        assert!((flight.altitude(0) - 1.0e7).abs() < 1e-6);
        assert!((flight.altitude(4) - 1.0e3).abs() < 1e-6);
        assert!((flight.altitude(2) - 1.0e5).abs() < 1e-3);
        assert!((flight.altitude(99) - 1.0e3).abs() < 1e-6);
    }

    #[test]
    fn test_single_frame_stays_at_start() {
        assert_eq!(flight(1).altitude(0), 1.0e7);
    }

    #[test]
    fn test_frames_number_from_one() {
        let flight = flight(3);
        assert_eq!(flight.frame(0).frame_number, 1);
        assert_eq!(flight.frame(2).frame_number, 3);
        assert_eq!(flight.frame(0).viewport_width, 1280);
        assert!((flight.frame(0).camera.frustum.aspect_ratio - 1280.0 / 720.0).abs() < 1e-12);
    }
}
