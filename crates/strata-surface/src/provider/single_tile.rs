//! Imagery provider backed by one image stretched over a rectangle.

use image::{Rgba, RgbaImage};
use strata_geo::{Ellipsoid, Rectangle, TileKey, TilingScheme};

use super::{Credit, ImageryProvider};
use crate::request::Responder;

/// Serves a single level-zero tile covering `rectangle`.
#[derive(Clone, Debug)]
pub struct SingleTileImageryProvider {
    tiling_scheme: TilingScheme,
    image: RgbaImage,
    credits: Vec<Credit>,
}

impl SingleTileImageryProvider {
    /// Cover the whole globe with `image`.
    pub fn new(image: RgbaImage) -> Self {
        Self::with_rectangle(image, Rectangle::MAX_VALUE)
    }

    pub fn with_rectangle(image: RgbaImage, rectangle: Rectangle) -> Self {
        Self {
            tiling_scheme: TilingScheme::new(rectangle, Ellipsoid::WGS84, 1, 1),
            image,
            credits: Vec::new(),
        }
    }

    /// A globe-covering image of one uniform color.
    pub fn solid(color: [u8; 4], width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width.max(1), height.max(1), Rgba(color)))
    }

    /// Decode an image file from disk.
    pub fn open(path: impl AsRef<std::path::Path>) -> image::ImageResult<Self> {
        Ok(Self::new(image::open(path)?.to_rgba8()))
    }

    pub fn with_credit(mut self, credit: Credit) -> Self {
        self.credits.push(credit);
        self
    }
}

impl ImageryProvider for SingleTileImageryProvider {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn tile_width(&self) -> u32 {
        self.image.width()
    }

    fn tile_height(&self) -> u32 {
        self.image.height()
    }

    fn maximum_level(&self) -> u32 {
        0
    }

    fn credits(&self) -> Vec<Credit> {
        self.credits.clone()
    }

    fn request_image(
        &self,
        _key: TileKey,
        responder: Responder<RgbaImage>,
    ) -> Result<(), Responder<RgbaImage>> {
        responder.resolve(Ok(self.image.clone()));
        Ok(())
    }
}
