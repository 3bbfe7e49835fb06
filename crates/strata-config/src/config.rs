//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile selection, caching and loading.
    pub surface: SurfaceConfig,
    /// Distance fog and its effect on refinement.
    pub fog: FogConfig,
    /// Headless viewer run.
    pub viewer: ViewerConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Surface tile provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Pixels of error tolerated before a tile is refined.
    pub maximum_screen_space_error: f64,
    /// Tiles kept loaded beyond those drawn in the current frame.
    pub tile_cache_size: usize,
    /// Wall-clock budget for tile loading per frame, in milliseconds.
    pub load_queue_time_slice_ms: f64,
    pub max_tile_loads_per_frame: usize,
    pub preload_ancestors: bool,
    /// Frames a parent may stand in for loading children before they are
    /// promoted to high priority.
    pub max_fallback_frames: u64,
    /// RGBA color drawn where no imagery covers the surface.
    pub base_color: Option<[f32; 4]>,
    pub vertical_exaggeration: f64,
    pub vertical_exaggeration_relative_height: f64,
    /// `[west, south, east, north]` in degrees. `None` draws the whole globe.
    pub cartographic_limit_rectangle_degrees: Option<[f64; 4]>,
    pub show_water_effect: bool,
    /// Texture units available to a single draw.
    pub max_texture_image_units: usize,
}

/// Fog configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FogConfig {
    pub enabled: bool,
    pub density: f64,
    pub screen_space_error_factor: f64,
}

/// Settings for the headless fly-in run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Number of frames to run.
    pub frames: u64,
    /// Camera altitude above the ellipsoid on the first frame, in meters.
    pub start_altitude_m: f64,
    /// Camera altitude on the last frame, in meters.
    pub end_altitude_m: f64,
    pub target_longitude_deg: f64,
    pub target_latitude_deg: f64,
    /// Vertical field of view.
    pub fovy_degrees: f64,
    /// Image draped over the globe. A solid color is used when unset.
    pub imagery_path: Option<PathBuf>,
    /// Terrain generation threads. 0 picks one per core.
    pub worker_threads: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g., "debug", "info,strata_surface=trace").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 2.0,
            tile_cache_size: 100,
            load_queue_time_slice_ms: 5.0,
            max_tile_loads_per_frame: 64,
            preload_ancestors: true,
            max_fallback_frames: 120,
            base_color: Some([0.0, 0.0, 1.0, 1.0]),
            vertical_exaggeration: 1.0,
            vertical_exaggeration_relative_height: 0.0,
            cartographic_limit_rectangle_degrees: None,
            show_water_effect: true,
            max_texture_image_units: 16,
        }
    }
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            density: 2.0e-4,
            screen_space_error_factor: 2.0,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames: 600,
            start_altitude_m: 2.0e7,
            end_altitude_m: 2_000.0,
            target_longitude_deg: -105.0,
            target_latitude_deg: 39.7,
            fovy_degrees: 60.0,
            imagery_path: None,
            worker_threads: 0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Platform config directory for strata tools, e.g. `~/.config/strata`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("strata"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::WriteError {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::WriteError {
            path: config_path.clone(),
            source,
        })?;
        log::debug!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let new_config = read_config(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
