//! Procedural terrain: fractal simplex noise sampled on the ellipsoid.

use glam::DVec3;
use image::{GrayImage, Luma};
use noise::{NoiseFn, Simplex};
use strata_geo::{Cartographic, Ellipsoid, TileKey, TilingScheme};
use strata_surface::provider::{TerrainSource, estimated_level_zero_geometric_error};
use strata_surface::{LoadFailure, TerrainData, WaterMask};

/// Samples per tile edge.
const TILE_SAMPLES: u32 = 33;

/// Multi-octave noise settings.
#[derive(Clone, Debug)]
pub struct NoiseParams {
    pub seed: u32,
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Cycles around the unit sphere for the first octave.
    pub base_frequency: f64,
    /// Amplitude of the first octave in meters.
    pub amplitude: f64,
    /// Offset added to every sample; negative values flood more terrain.
    pub sea_level_offset: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 7,
            octaves: 8,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.5,
            amplitude: 4_000.0,
            sea_level_offset: -500.0,
        }
    }
}

/// Heightmap terrain generated from fBm over 3D simplex noise. Negative
/// heights become sea: flattened to zero and flagged in the water mask.
pub struct NoiseTerrain {
    tiling_scheme: TilingScheme,
    noise: Simplex,
    params: NoiseParams,
    level_zero_error: f64,
}

impl NoiseTerrain {
    pub fn new(ellipsoid: Ellipsoid, params: NoiseParams) -> Self {
        let tiling_scheme = TilingScheme::geographic(ellipsoid);
        let level_zero_error = estimated_level_zero_geometric_error(
            &ellipsoid,
            TILE_SAMPLES - 1,
            tiling_scheme.number_of_x_tiles_at_level(0),
        );
        Self {
            tiling_scheme,
            noise: Simplex::new(params.seed),
            params,
            level_zero_error,
        }
    }

    /// Geometric sum of all octave amplitudes.
    pub fn max_amplitude(&self) -> f64 {
        (0..self.params.octaves)
            .map(|octave| self.params.amplitude * self.params.persistence.powi(octave as i32))
            .sum()
    }

    /// Height in meters above the ellipsoid at `position`, before sea
    /// flattening.
    pub fn sample(&self, position: &Cartographic) -> f64 {
        let direction = self
            .tiling_scheme
            .ellipsoid()
            .geodetic_surface_normal_cartographic(position);
        self.sample_direction(direction)
    }

    fn sample_direction(&self, direction: DVec3) -> f64 {
        let mut total = self.params.sea_level_offset;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;
        for _ in 0..self.params.octaves {
            let point = direction * frequency;
            total += self.noise.get([point.x, point.y, point.z]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }
        total
    }
}

impl TerrainSource for NoiseTerrain {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_error / f64::from(1u32 << level.min(31))
    }

    fn maximum_level(&self) -> u32 {
        18
    }

    fn approximate_height_range(&self, _key: TileKey) -> (f64, f64) {
        (0.0, (self.max_amplitude() + self.params.sea_level_offset).max(0.0))
    }

    fn has_water_mask(&self) -> bool {
        true
    }

    fn generate(&self, key: TileKey) -> Result<TerrainData, LoadFailure> {
        let rectangle = self.tiling_scheme.tile_xy_to_rectangle(key);
        let last = f64::from(TILE_SAMPLES - 1);
        let mut heights = Vec::with_capacity((TILE_SAMPLES * TILE_SAMPLES) as usize);
        let mut mask = GrayImage::new(TILE_SAMPLES, TILE_SAMPLES);
        let mut water_samples = 0;

        for row in 0..TILE_SAMPLES {
            let latitude = rectangle.north - rectangle.height() * f64::from(row) / last;
            for column in 0..TILE_SAMPLES {
                let longitude = rectangle.west + rectangle.width() * f64::from(column) / last;
                let height = self.sample(&Cartographic::new(longitude, latitude, 0.0));
                if height < 0.0 {
                    water_samples += 1;
                    mask.put_pixel(column, row, Luma([255]));
                    heights.push(0.0);
                } else {
                    heights.push(height as f32);
                }
            }
        }

        let water_mask = match water_samples {
            0 => WaterMask::Uniform { water: false },
            n if n == heights.len() => WaterMask::Uniform { water: true },
            _ => WaterMask::Grid(mask),
        };
        Ok(TerrainData {
            width: TILE_SAMPLES,
            height: TILE_SAMPLES,
            heights,
            water_mask: Some(water_mask),
            child_tile_mask: if key.level < self.maximum_level() { 0b1111 } else { 0 },
        })
    }
}
