//! The seam between the surface and the graphics backend.
//!
//! The surface never touches GPU objects directly. It asks a
//! [`RenderResources`] implementation to create and release opaque handles
//! and passes those handles through to the draw passes it emits.

use image::{GrayImage, RgbaImage};
use rustc_hash::FxHashSet;
use strata_geo::TileKey;

use crate::provider::TerrainData;

/// Opaque handle to a backend texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a backend vertex array built from terrain data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u64);

/// GPU resource factory used by the surface.
///
/// Every handle returned by a `create_*` method is released exactly once
/// through the matching `release_*` method when the surface stops using it.
pub trait RenderResources {
    /// Upload a decoded imagery tile.
    fn create_texture(&mut self, image: &RgbaImage) -> TextureHandle;

    /// Upload a single-channel mask, such as a water mask.
    fn create_mask_texture(&mut self, mask: &GrayImage) -> TextureHandle;

    /// Upload packed floating point data, such as encoded clipping planes.
    /// `texels` holds RGBA quadruples, `width` of them per row.
    fn create_data_texture(&mut self, texels: &[f32], width: u32) -> TextureHandle;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Build renderable geometry for a tile's terrain.
    fn create_vertex_array(&mut self, key: TileKey, terrain: &TerrainData) -> VertexArrayHandle;

    fn release_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Number of textures a single draw can sample.
    fn maximum_texture_image_units(&self) -> usize;
}

/// A backend that hands out handles without touching a GPU.
///
/// Tracks which handles are live so callers can verify that everything the
/// surface created is eventually released.
#[derive(Debug)]
pub struct HeadlessResources {
    next_handle: u64,
    max_texture_units: usize,
    live_textures: FxHashSet<TextureHandle>,
    live_vertex_arrays: FxHashSet<VertexArrayHandle>,
    textures_created: u64,
}

impl HeadlessResources {
    pub fn new(max_texture_units: usize) -> Self {
        Self {
            next_handle: 1,
            max_texture_units,
            live_textures: FxHashSet::default(),
            live_vertex_arrays: FxHashSet::default(),
            textures_created: 0,
        }
    }

    pub fn live_texture_count(&self) -> usize {
        self.live_textures.len()
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.live_vertex_arrays.len()
    }

    pub fn is_live_texture(&self, texture: TextureHandle) -> bool {
        self.live_textures.contains(&texture)
    }

    /// Total textures ever created, released or not.
    pub fn textures_created(&self) -> u64 {
        self.textures_created
    }

    fn next_texture(&mut self) -> TextureHandle {
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.textures_created += 1;
        self.live_textures.insert(handle);
        handle
    }
}

impl Default for HeadlessResources {
    fn default() -> Self {
        Self::new(16)
    }
}

impl RenderResources for HeadlessResources {
    fn create_texture(&mut self, _image: &RgbaImage) -> TextureHandle {
        self.next_texture()
    }

    fn create_mask_texture(&mut self, _mask: &GrayImage) -> TextureHandle {
        self.next_texture()
    }

    fn create_data_texture(&mut self, _texels: &[f32], _width: u32) -> TextureHandle {
        self.next_texture()
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if !self.live_textures.remove(&texture) {
            tracing::warn!(?texture, "released a texture that is not live");
        }
    }

    fn create_vertex_array(&mut self, _key: TileKey, _terrain: &TerrainData) -> VertexArrayHandle {
        let handle = VertexArrayHandle(self.next_handle);
        self.next_handle += 1;
        self.live_vertex_arrays.insert(handle);
        handle
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if !self.live_vertex_arrays.remove(&vertex_array) {
            tracing::warn!(?vertex_array, "released a vertex array that is not live");
        }
    }

    fn maximum_texture_image_units(&self) -> usize {
        self.max_texture_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_tracks_live_handles() {
        let mut resources = HeadlessResources::new(8);
        let image = RgbaImage::new(2, 2);
        let a = resources.create_texture(&image);
        let b = resources.create_data_texture(&[0.0; 4], 1);
        assert_ne!(a, b);
        assert_eq!(resources.live_texture_count(), 2);

        resources.release_texture(a);
        assert_eq!(resources.live_texture_count(), 1);
        assert!(!resources.is_live_texture(a));
        assert!(resources.is_live_texture(b));
        assert_eq!(resources.textures_created(), 2);
    }

    #[test]
    fn test_headless_vertex_arrays() {
        let mut resources = HeadlessResources::default();
        let data = TerrainData::flat(4, 4);
        let va = resources.create_vertex_array(TileKey::new(0, 0, 0), &data);
        assert_eq!(resources.live_vertex_array_count(), 1);
        resources.release_vertex_array(va);
        assert_eq!(resources.live_vertex_array_count(), 0);
        assert_eq!(resources.maximum_texture_image_units(), 16);
    }
}
