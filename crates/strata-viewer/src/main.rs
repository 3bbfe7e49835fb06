//! Headless viewer that flies a camera down to the globe and logs what the
//! surface does each frame.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p strata-viewer -- --frames 300 --imagery earth.png`.

mod flight;
mod terrain;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use strata_config::{CliArgs, Config, ConfigError, default_config_dir};
use strata_geo::{Ellipsoid, Rectangle};
use strata_surface::provider::{SingleTileImageryProvider, ThreadedTerrainProvider, WorkerPool};
use strata_surface::{
    Color, ConfigurationError, Credit, Fog, GlobeSurface, HeadlessResources, ImageryLayer, SurfaceOptions,
};
use tracing::{debug, error, info};

use crate::flight::FlyIn;
use crate::terrain::{NoiseParams, NoiseTerrain};

/// Jobs the terrain workers may have queued before requests are throttled.
const TERRAIN_QUEUE_CAPACITY: usize = 256;

/// Frames between statistics log lines.
const REPORT_INTERVAL: u64 = 30;

#[derive(Debug, thiserror::Error)]
enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start terrain workers: {0}")]
    Workers(#[source] std::io::Error),
    #[error("failed to open imagery: {0}")]
    Imagery(#[from] image::ImageError),
    #[error("surface rejected configuration: {0}")]
    Surface(#[from] ConfigurationError),
}

/// Translate persisted settings into surface options.
fn surface_options(config: &Config) -> SurfaceOptions {
    let surface = &config.surface;
    let limit = surface
        .cartographic_limit_rectangle_degrees
        .map_or(Rectangle::MAX_VALUE, |[west, south, east, north]| {
            Rectangle::from_degrees(west, south, east, north)
        });
    SurfaceOptions {
        maximum_screen_space_error: surface.maximum_screen_space_error,
        tile_cache_size: surface.tile_cache_size,
        load_queue_time_slice: Duration::from_secs_f64(surface.load_queue_time_slice_ms.max(0.0) / 1000.0),
        max_tile_loads_per_frame: surface.max_tile_loads_per_frame,
        preload_ancestors: surface.preload_ancestors,
        max_fallback_frames: surface.max_fallback_frames,
        base_color: surface.base_color.map(Color::from_array),
        vertical_exaggeration: surface.vertical_exaggeration,
        vertical_exaggeration_relative_height: surface.vertical_exaggeration_relative_height,
        cartographic_limit_rectangle: limit,
        show_water_effect: surface.show_water_effect,
        fog: Fog {
            enabled: config.fog.enabled,
            density: config.fog.density,
            screen_space_error_factor: config.fog.screen_space_error_factor,
        },
    }
}

/// The base imagery layer plus a translucent highlight over the target.
fn imagery_layers(config: &Config) -> Result<Vec<ImageryLayer>, ViewerError> {
    let base = match &config.viewer.imagery_path {
        Some(path) => {
            info!(path = %path.display(), "loading base imagery");
            SingleTileImageryProvider::open(path)?
        }
        None => SingleTileImageryProvider::solid([34, 92, 58, 255], 256, 256),
    };

    let viewer = &config.viewer;
    let highlight = SingleTileImageryProvider::with_rectangle(
        image::RgbaImage::from_pixel(16, 16, image::Rgba([255, 200, 40, 255])),
        Rectangle::from_degrees(
            viewer.target_longitude_deg - 2.0,
            (viewer.target_latitude_deg - 2.0).max(-90.0),
            viewer.target_longitude_deg + 2.0,
            (viewer.target_latitude_deg + 2.0).min(90.0),
        ),
    )
    .with_credit(Credit::new("strata highlight"));

    Ok(vec![
        ImageryLayer::new(Arc::new(base)),
        ImageryLayer::new(Arc::new(highlight)).with_alpha(0.4),
    ])
}

fn run(config: &Config) -> Result<(), ViewerError> {
    let source = Arc::new(NoiseTerrain::new(Ellipsoid::WGS84, NoiseParams::default()));
    let pool = match config.viewer.worker_threads {
        0 => WorkerPool::with_defaults(source),
        threads => WorkerPool::new(source, threads, TERRAIN_QUEUE_CAPACITY),
    }
    .map_err(ViewerError::Workers)?;
    let terrain = ThreadedTerrainProvider::new(pool).with_credit(Credit::new("strata procedural terrain"));

    let mut builder = GlobeSurface::builder()
        .terrain_provider(Arc::new(terrain))
        .resources(HeadlessResources::new(config.surface.max_texture_image_units))
        .options(surface_options(config));
    for layer in imagery_layers(config)? {
        builder = builder.imagery_layer(layer);
    }
    let mut surface = builder.build()?;

    let flight = FlyIn::new(*surface.ellipsoid(), &config.viewer);
    info!(
        frames = flight.frames(),
        start_altitude = flight.altitude(0),
        end_altitude = flight.altitude(flight.frames() - 1),
        "starting fly-in"
    );

    let started = Instant::now();
    for index in 0..flight.frames() {
        let frame = flight.frame(index);
        let passes = surface.update(&frame).len();
        let stats = surface.statistics();
        debug!(frame = frame.frame_number, passes, rendered = stats.tiles_rendered, "frame");
        if index % REPORT_INTERVAL == 0 || index + 1 == flight.frames() {
            info!(
                frame = frame.frame_number,
                altitude = flight.altitude(index),
                rendered = stats.tiles_rendered,
                culled = stats.tiles_culled,
                waiting = stats.tiles_waiting_for_children,
                max_depth = stats.max_depth_rendered,
                cached = stats.tiles_in_cache,
                queued = stats.load_queue_high + stats.load_queue_medium + stats.load_queue_low,
                passes,
                "surface statistics"
            );
        }
    }

    let credits: Vec<&str> = surface.credits().iter().map(|credit| credit.text.as_str()).collect();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        tiles = surface.tile_count(),
        textures = surface.resources().live_texture_count(),
        credits = ?credits,
        "fly-in finished"
    );

    surface.release_resources();
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config.debug.log_dir.clone().unwrap_or_else(|| config_dir.join("logs"));
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "viewer failed");
            ExitCode::FAILURE
        }
    }
}
