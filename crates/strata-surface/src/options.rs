//! Construction-time and runtime options of a surface.

use std::time::Duration;

use strata_geo::Rectangle;

use crate::error::ConfigurationError;
use crate::frame::Fog;

/// Linear RGBA color with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_array(rgba: [f32; 4]) -> Self {
        Self::new(rgba[0], rgba[1], rgba[2], rgba[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Tunables of a [`GlobeSurface`](crate::GlobeSurface).
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceOptions {
    /// Refine tiles whose projected error exceeds this many pixels.
    pub maximum_screen_space_error: f64,
    /// Tiles kept in the replacement queue before off-screen ones are evicted.
    pub tile_cache_size: usize,
    /// Time allowed per frame for processing the load queue.
    pub load_queue_time_slice: Duration,
    /// Tiles processed per frame from the load queue, at most.
    pub max_tile_loads_per_frame: usize,
    /// Keep loading ancestors of rendered tiles so zooming out is seamless.
    pub preload_ancestors: bool,
    /// Frames a tile may stand in for loading children before they are
    /// promoted to the high-priority queue.
    pub max_fallback_frames: u64,
    /// Color where no imagery covers a tile. Must be set.
    pub base_color: Option<Color>,
    pub vertical_exaggeration: f64,
    pub vertical_exaggeration_relative_height: f64,
    /// Only tiles overlapping this rectangle are drawn.
    pub cartographic_limit_rectangle: Rectangle,
    pub show_water_effect: bool,
    pub fog: Fog,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 2.0,
            tile_cache_size: 100,
            load_queue_time_slice: Duration::from_millis(5),
            max_tile_loads_per_frame: 64,
            preload_ancestors: true,
            max_fallback_frames: 120,
            base_color: Some(Color::BLUE),
            vertical_exaggeration: 1.0,
            vertical_exaggeration_relative_height: 0.0,
            cartographic_limit_rectangle: Rectangle::MAX_VALUE,
            show_water_effect: true,
            fog: Fog::default(),
        }
    }
}

impl SurfaceOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.base_color.is_none() {
            return Err(ConfigurationError::UndefinedBaseColor);
        }
        if !(self.maximum_screen_space_error.is_finite() && self.maximum_screen_space_error > 0.0) {
            return Err(ConfigurationError::InvalidOption(format!(
                "maximum_screen_space_error must be positive, got {}",
                self.maximum_screen_space_error
            )));
        }
        if self.max_tile_loads_per_frame == 0 {
            return Err(ConfigurationError::InvalidOption(
                "max_tile_loads_per_frame must be at least 1".into(),
            ));
        }
        validate_exaggeration(self.vertical_exaggeration, self.vertical_exaggeration_relative_height)?;
        validate_limit_rectangle(&self.cartographic_limit_rectangle)?;
        if !(self.fog.density.is_finite() && self.fog.density >= 0.0) {
            return Err(ConfigurationError::InvalidOption(format!(
                "fog density must be non-negative, got {}",
                self.fog.density
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_exaggeration(exaggeration: f64, relative_height: f64) -> Result<(), ConfigurationError> {
    if !(exaggeration.is_finite() && exaggeration >= 0.0) || !relative_height.is_finite() {
        return Err(ConfigurationError::InvalidOption(format!(
            "vertical exaggeration {exaggeration} about {relative_height} is not valid"
        )));
    }
    Ok(())
}

pub(crate) fn validate_limit_rectangle(rectangle: &Rectangle) -> Result<(), ConfigurationError> {
    let finite = [rectangle.west, rectangle.south, rectangle.east, rectangle.north]
        .iter()
        .all(|value| value.is_finite());
    if !finite || rectangle.south > rectangle.north {
        return Err(ConfigurationError::InvalidOption(format!(
            "cartographic limit rectangle {rectangle:?} is not valid"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(SurfaceOptions::default().validate(), Ok(()));
    }

    #[test]
    fn test_missing_base_color_rejected() {
        let options = SurfaceOptions {
            base_color: None,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ConfigurationError::UndefinedBaseColor));
    }

    #[test]
    fn test_bad_values_rejected() {
        let options = SurfaceOptions {
            maximum_screen_space_error: 0.0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(ConfigurationError::InvalidOption(_))));

        let options = SurfaceOptions {
            vertical_exaggeration: f64::NAN,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = SurfaceOptions {
            cartographic_limit_rectangle: Rectangle::new(0.0, 1.0, 1.0, 0.0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    /// A limit rectangle crossing the antimeridian is accepted.
    #[test]
    fn test_wrapping_limit_rectangle_allowed() {
        assert!(validate_limit_rectangle(&Rectangle::from_degrees(170.0, -10.0, -170.0, 10.0)).is_ok());
    }
}
