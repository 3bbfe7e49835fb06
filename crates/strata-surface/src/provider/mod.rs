//! Interfaces to terrain and imagery sources, plus the built-in providers.

mod ellipsoid;
mod manual;
mod single_tile;
mod worker_pool;

pub use ellipsoid::EllipsoidTerrainProvider;
pub use manual::{ManualImageryProvider, ManualTerrainProvider};
pub use single_tile::SingleTileImageryProvider;
pub use worker_pool::{TerrainSource, ThreadedTerrainProvider, WorkerPool};

use image::{GrayImage, RgbaImage};
use strata_geo::{Ellipsoid, Rectangle, TileKey, TilingScheme};

use crate::request::Responder;

/// Heightmap quality factor used to estimate geometric error from terrain
/// resolution. Lower values demand finer tiles before they are considered
/// accurate enough.
pub const HEIGHTMAP_TERRAIN_QUALITY: f64 = 0.25;

/// Estimate the geometric error of level-zero tiles for a heightmap with
/// `tile_image_width` samples per edge and `tiles_at_level_zero` root tiles
/// around the equator.
pub fn estimated_level_zero_geometric_error(
    ellipsoid: &Ellipsoid,
    tile_image_width: u32,
    tiles_at_level_zero: u32,
) -> f64 {
    ellipsoid.maximum_radius() * 2.0 * std::f64::consts::PI * HEIGHTMAP_TERRAIN_QUALITY
        / (f64::from(tile_image_width) * f64::from(tiles_at_level_zero))
}

/// Which parts of a tile are covered by water.
#[derive(Clone, Debug, PartialEq)]
pub enum WaterMask {
    /// The whole tile is land or the whole tile is water.
    Uniform { water: bool },
    /// A square grid of coverage values, 0 for land and 255 for water.
    Grid(GrayImage),
}

/// Raw terrain for one tile as returned by a terrain provider.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainData {
    /// Samples per row.
    pub width: u32,
    /// Rows of samples.
    pub height: u32,
    /// Heights in meters above the ellipsoid, row-major from the north edge.
    pub heights: Vec<f32>,
    pub water_mask: Option<WaterMask>,
    /// Bit `i` is set when child `i` (northwest, northeast, southwest,
    /// southeast) has data of its own.
    pub child_tile_mask: u8,
}

impl TerrainData {
    /// A tile lying exactly on the ellipsoid.
    pub fn flat(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            heights: vec![0.0; (width * height) as usize],
            water_mask: None,
            child_tile_mask: 0b1111,
        }
    }

    pub fn with_water_mask(mut self, water_mask: WaterMask) -> Self {
        self.water_mask = Some(water_mask);
        self
    }

    pub fn with_child_tile_mask(mut self, child_tile_mask: u8) -> Self {
        self.child_tile_mask = child_tile_mask;
        self
    }

    /// Minimum and maximum height, `(0, 0)` when there are no samples.
    pub fn height_range(&self) -> (f64, f64) {
        let mut iter = self.heights.iter().copied();
        let Some(first) = iter.next() else {
            return (0.0, 0.0);
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), h| (lo.min(h), hi.max(h)));
        (f64::from(min), f64::from(max))
    }

    pub fn is_child_available(&self, child_index: usize) -> bool {
        child_index < 4 && self.child_tile_mask & (1 << child_index) != 0
    }
}

/// An attribution string shown for data on screen.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Credit {
    pub text: String,
    /// Shown in the viewport rather than in an expandable list.
    pub show_on_screen: bool,
}

impl Credit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            show_on_screen: false,
        }
    }
}

/// A source of terrain tiles.
///
/// Requests are answered through the supplied [`Responder`], from any
/// thread and at any later time. Results never reach tiles during the
/// frame that issued the request.
pub trait TerrainProvider: Send + Sync {
    fn tiling_scheme(&self) -> &TilingScheme;

    /// Geometric error, in meters, of tiles at `level`.
    fn level_maximum_geometric_error(&self, level: u32) -> f64;

    /// Deepest level the provider can serve.
    fn maximum_level(&self) -> u32 {
        20
    }

    fn level_zero_tiles(&self) -> Vec<TileKey> {
        self.tiling_scheme().level_zero_tiles()
    }

    /// Whether data exists for `key`. `None` when the provider cannot tell
    /// without loading an ancestor.
    fn tile_data_available(&self, _key: TileKey) -> Option<bool> {
        None
    }

    /// Height bounds to assume for a tile before its data arrives.
    fn approximate_height_range(&self, _key: TileKey) -> (f64, f64) {
        (0.0, 0.0)
    }

    fn has_water_mask(&self) -> bool {
        false
    }

    fn credits(&self) -> Vec<Credit> {
        Vec::new()
    }

    /// Start loading `key`.
    ///
    /// Returns `Err(responder)` when the provider is saturated; the surface
    /// will ask again on a later frame.
    fn request_tile(
        &self,
        key: TileKey,
        responder: Responder<TerrainData>,
    ) -> Result<(), Responder<TerrainData>>;
}

/// A source of imagery tiles.
pub trait ImageryProvider: Send + Sync {
    fn tiling_scheme(&self) -> &TilingScheme;

    /// Region with data. Defaults to the tiling scheme's rectangle.
    fn rectangle(&self) -> Rectangle {
        *self.tiling_scheme().rectangle()
    }

    /// Width of each tile in pixels.
    fn tile_width(&self) -> u32;

    /// Height of each tile in pixels.
    fn tile_height(&self) -> u32;

    fn minimum_level(&self) -> u32 {
        0
    }

    fn maximum_level(&self) -> u32;

    fn credits(&self) -> Vec<Credit> {
        Vec::new()
    }

    /// Start loading the image for `key`. Same contract as
    /// [`TerrainProvider::request_tile`].
    fn request_image(
        &self,
        key: TileKey,
        responder: Responder<RgbaImage>,
    ) -> Result<(), Responder<RgbaImage>>;
}
