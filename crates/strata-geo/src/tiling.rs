//! Tile addressing and the geographic tiling scheme.

use crate::{Cartographic, Ellipsoid, Rectangle, TWO_PI};

/// Uniquely identifies a tile within a tiling scheme.
///
/// Level 0 holds the scheme's root tiles; each level doubles the tile
/// count along both axes. `x` grows eastward and `y` grows southward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Quadtree depth, 0 for root tiles.
    pub level: u32,
    /// Column, counted from the scheme's western edge.
    pub x: u32,
    /// Row, counted from the scheme's northern edge.
    pub y: u32,
}

impl TileKey {
    pub const fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// The four children in northwest, northeast, southwest, southeast order.
    #[must_use]
    pub fn children(&self) -> [TileKey; 4] {
        let level = self.level + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        [
            TileKey::new(level, x, y),
            TileKey::new(level, x + 1, y),
            TileKey::new(level, x, y + 1),
            TileKey::new(level, x + 1, y + 1),
        ]
    }

    /// The tile one level up, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(TileKey::new(self.level - 1, self.x / 2, self.y / 2))
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}X{}Y{}", self.level, self.x, self.y)
    }
}

/// A geographic (equirectangular) tiling of a rectangle of the ellipsoid.
#[derive(Clone, Debug, PartialEq)]
pub struct TilingScheme {
    rectangle: Rectangle,
    ellipsoid: Ellipsoid,
    level_zero_tiles_x: u32,
    level_zero_tiles_y: u32,
}

impl TilingScheme {
    /// The standard whole-globe scheme: two root tiles, one per hemisphere
    /// of longitude.
    pub fn geographic(ellipsoid: Ellipsoid) -> Self {
        Self::new(Rectangle::MAX_VALUE, ellipsoid, 2, 1)
    }

    /// A scheme over an arbitrary rectangle.
    pub fn new(
        rectangle: Rectangle,
        ellipsoid: Ellipsoid,
        level_zero_tiles_x: u32,
        level_zero_tiles_y: u32,
    ) -> Self {
        Self {
            rectangle,
            ellipsoid,
            level_zero_tiles_x: level_zero_tiles_x.max(1),
            level_zero_tiles_y: level_zero_tiles_y.max(1),
        }
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn number_of_x_tiles_at_level(&self, level: u32) -> u32 {
        self.level_zero_tiles_x << level
    }

    pub fn number_of_y_tiles_at_level(&self, level: u32) -> u32 {
        self.level_zero_tiles_y << level
    }

    /// Keys of every root tile, row by row from the northwest.
    pub fn level_zero_tiles(&self) -> Vec<TileKey> {
        let mut keys = Vec::with_capacity((self.level_zero_tiles_x * self.level_zero_tiles_y) as usize);
        for y in 0..self.level_zero_tiles_y {
            for x in 0..self.level_zero_tiles_x {
                keys.push(TileKey::new(0, x, y));
            }
        }
        keys
    }

    /// The cartographic rectangle covered by a tile.
    pub fn tile_xy_to_rectangle(&self, key: TileKey) -> Rectangle {
        let x_tiles = self.number_of_x_tiles_at_level(key.level) as f64;
        let y_tiles = self.number_of_y_tiles_at_level(key.level) as f64;
        let tile_width = self.rectangle.width() / x_tiles;
        let tile_height = self.rectangle.height() / y_tiles;

        let west = self.rectangle.west + key.x as f64 * tile_width;
        let east = self.rectangle.west + (key.x + 1) as f64 * tile_width;
        let north = self.rectangle.north - key.y as f64 * tile_height;
        let south = self.rectangle.north - (key.y + 1) as f64 * tile_height;
        Rectangle::new(west, south, east, north)
    }

    /// The tile at `level` containing `position`, or `None` if the position
    /// lies outside the scheme's rectangle.
    pub fn position_to_tile_xy(&self, position: &Cartographic, level: u32) -> Option<TileKey> {
        if !self.rectangle.contains(position) {
            return None;
        }
        let x_tiles = self.number_of_x_tiles_at_level(level);
        let y_tiles = self.number_of_y_tiles_at_level(level);
        let tile_width = self.rectangle.width() / x_tiles as f64;
        let tile_height = self.rectangle.height() / y_tiles as f64;

        let mut longitude = position.longitude;
        if self.rectangle.east < self.rectangle.west && longitude < 0.0 {
            longitude += TWO_PI;
        }

        let x = (((longitude - self.rectangle.west) / tile_width).max(0.0) as u32).min(x_tiles - 1);
        let y = (((self.rectangle.north - position.latitude) / tile_height).max(0.0) as u32).min(y_tiles - 1);
        Some(TileKey::new(level, x, y))
    }
}
