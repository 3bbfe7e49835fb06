//! Per-frame inputs: camera, viewport and scene mode, plus fog derived
//! from them.

use glam::DVec3;
use strata_geo::{Cartographic, CullingVolume, Ellipsoid, PerspectiveFrustum};

/// How the globe is projected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SceneMode {
    #[default]
    Scene3D,
    ColumbusView,
    Scene2D,
}

/// Camera pose in world (earth-centered) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub position: DVec3,
    /// Unit view direction.
    pub direction: DVec3,
    /// Unit up vector.
    pub up: DVec3,
    pub frustum: PerspectiveFrustum,
}

impl CameraState {
    pub fn new(position: DVec3, direction: DVec3, up: DVec3, frustum: PerspectiveFrustum) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            up: up.normalize_or_zero(),
            frustum,
        }
    }

    /// A camera at `target` raised to its height, looking straight down with
    /// north up.
    pub fn looking_down(ellipsoid: &Ellipsoid, target: &Cartographic, frustum: PerspectiveFrustum) -> Self {
        let position = ellipsoid.cartographic_to_cartesian(target);
        let normal = ellipsoid.geodetic_surface_normal_cartographic(target);
        let east = DVec3::Z.cross(normal).normalize_or(DVec3::Y);
        let north = normal.cross(east);
        Self::new(position, -normal, north, frustum)
    }

    pub fn culling_volume(&self) -> CullingVolume {
        CullingVolume::from_camera(&self.frustum, self.position, self.direction, self.up)
    }

    pub fn position_cartographic(&self, ellipsoid: &Ellipsoid) -> Cartographic {
        ellipsoid.cartesian_to_cartographic(self.position)
    }
}

/// Fog settings for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FogState {
    pub enabled: bool,
    pub density: f64,
    /// How strongly fog reduces a tile's screen-space error.
    pub screen_space_error_factor: f64,
}

impl Default for FogState {
    fn default() -> Self {
        Self {
            enabled: true,
            density: 2.0e-4,
            screen_space_error_factor: 2.0,
        }
    }
}

impl FogState {
    pub const DISABLED: FogState = FogState {
        enabled: false,
        density: 0.0,
        screen_space_error_factor: 0.0,
    };

    /// Fog opacity at `distance`, from 0 (clear) to 1 (opaque).
    pub fn fog_factor(&self, distance: f64) -> f64 {
        let scalar = distance * self.density;
        1.0 - (-(scalar * scalar)).exp()
    }

    /// Whether an object at `distance` is hidden entirely by fog.
    pub fn culls(&self, distance: f64) -> bool {
        self.enabled && self.fog_factor(distance) >= 1.0
    }

    /// Screen-space error after fog attenuation.
    pub fn attenuate(&self, error: f64, distance: f64) -> f64 {
        if self.enabled {
            error - self.fog_factor(distance) * self.screen_space_error_factor
        } else {
            error
        }
    }
}

/// Camera heights (meters) at which the fog density table is sampled.
const FOG_HEIGHTS: [f64; 20] = [
    359.393, 800.749, 1275.6501, 2151.1192, 3141.7763, 4777.5198, 6281.2493, 12364.307, 15900.765, 49889.0549,
    78026.8259, 99260.7344, 120036.3873, 151011.0158, 156091.1953, 203849.3112, 274866.9803, 319916.3149,
    493552.0528, 628733.5874,
];

/// Relative fog density at each of [`FOG_HEIGHTS`].
const FOG_DENSITIES: [f64; 20] = [
    2.0e-5, 2.0e-4, 1.0e-4, 7.0e-5, 5.0e-5, 4.0e-5, 3.0e-5, 1.9e-5, 1.0e-5, 8.5e-6, 6.2e-6, 5.8e-6, 5.3e-6, 5.2e-6,
    5.1e-6, 4.2e-6, 4.0e-6, 3.4e-6, 2.6e-6, 2.2e-6,
];

/// Cameras above this height see no fog.
const FOG_CEILING: f64 = 800_000.0;

/// Scene-level fog configuration, turned into a [`FogState`] per frame from
/// the camera's height and tilt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub enabled: bool,
    /// Density at the densest point of the height table.
    pub density: f64,
    pub screen_space_error_factor: f64,
}

impl Default for Fog {
    fn default() -> Self {
        let state = FogState::default();
        Self {
            enabled: state.enabled,
            density: state.density,
            screen_space_error_factor: state.screen_space_error_factor,
        }
    }
}

impl Fog {
    /// Fog for this frame. Disabled in space and outside 3D mode; thins out
    /// with height and as the camera looks straight down.
    pub fn frame_state(&self, camera: &CameraState, ellipsoid: &Ellipsoid, mode: SceneMode) -> FogState {
        if !self.enabled || mode != SceneMode::Scene3D {
            return FogState::DISABLED;
        }
        let height = camera.position_cartographic(ellipsoid).height;
        if !height.is_finite() || height > FOG_CEILING {
            return FogState::DISABLED;
        }

        let interval = FOG_HEIGHTS
            .windows(2)
            .position(|pair| height < pair[1])
            .unwrap_or(FOG_HEIGHTS.len() - 2);
        let t = ((height - FOG_HEIGHTS[interval]) / (FOG_HEIGHTS[interval + 1] - FOG_HEIGHTS[interval])).clamp(0.0, 1.0);
        let relative = FOG_DENSITIES[interval] + (FOG_DENSITIES[interval + 1] - FOG_DENSITIES[interval]) * t;
        let peak = FOG_DENSITIES[1];

        let up = camera.position.normalize_or_zero();
        let tilt = 1.0 - camera.direction.dot(up).abs();

        FogState {
            enabled: true,
            density: self.density * (relative / peak) * tilt,
            screen_space_error_factor: self.screen_space_error_factor,
        }
    }
}

/// Everything the surface needs to know about the frame being built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameState {
    pub frame_number: u64,
    pub camera: CameraState,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub mode: SceneMode,
}

impl FrameState {
    pub fn new(frame_number: u64, camera: CameraState, viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            frame_number,
            camera,
            viewport_width,
            viewport_height,
            mode: SceneMode::Scene3D,
        }
    }

    pub fn with_mode(mut self, mode: SceneMode) -> Self {
        self.mode = mode;
        self
    }
}
