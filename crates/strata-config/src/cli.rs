//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata viewer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata-viewer", about = "Headless quadtree terrain surface viewer")]
pub struct CliArgs {
    /// Number of frames to run.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Viewport width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Starting camera altitude in meters.
    #[arg(long)]
    pub altitude: Option<f64>,

    /// Maximum screen-space error in pixels.
    #[arg(long)]
    pub sse: Option<f64>,

    /// Image file to drape over the globe.
    #[arg(long)]
    pub imagery: Option<PathBuf>,

    /// Disable distance fog.
    #[arg(long)]
    pub no_fog: bool,

    /// Log level (error, warn, info, debug, trace) or a full filter string.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(frames) = args.frames {
            self.viewer.frames = frames;
        }
        if let Some(w) = args.width {
            self.viewer.width = w;
        }
        if let Some(h) = args.height {
            self.viewer.height = h;
        }
        if let Some(altitude) = args.altitude {
            self.viewer.start_altitude_m = altitude;
        }
        if let Some(sse) = args.sse {
            self.surface.maximum_screen_space_error = sse;
        }
        if let Some(ref path) = args.imagery {
            self.viewer.imagery_path = Some(path.clone());
        }
        if args.no_fog {
            self.fog.enabled = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            frames: Some(30),
            sse: Some(4.0),
            no_fog: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.viewer.frames, 30);
        assert_eq!(config.surface.maximum_screen_space_error, 4.0);
        assert!(!config.fog.enabled);
        // Non-overridden fields retain defaults
        assert_eq!(config.viewer.width, 1280);
        assert_eq!(config.surface.tile_cache_size, 100);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["strata-viewer", "--frames", "10", "--imagery", "earth.png", "--no-fog"]);
        assert_eq!(args.frames, Some(10));
        assert_eq!(args.imagery, Some(PathBuf::from("earth.png")));
        assert!(args.no_fog);
        assert_eq!(args.log_level, None);
    }
}
