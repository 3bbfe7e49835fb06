//! Splits a tile's imagery into draw passes that fit the texture units.
//!
//! The first pass covers the tile opaquely over the base color. Each later
//! pass alpha-blends its layers over what is already drawn, starting from a
//! fully transparent accumulation color.

use glam::DVec4;
use strata_geo::{Rectangle, TileKey};

use crate::imagery::{ImageryId, LayerId, LayerSnapshot, LayerUniforms};
use crate::options::Color;
use crate::resources::{TextureHandle, VertexArrayHandle};
use crate::tile::TileId;

/// Texture units taken by a water mask.
pub const WATER_MASK_TEXTURE_UNITS: usize = 1;
/// Texture units taken by clipping planes.
pub const CLIPPING_PLANES_TEXTURE_UNITS: usize = 1;
/// Texture units taken by clipping polygons: positions and extents.
pub const CLIPPING_POLYGONS_TEXTURE_UNITS: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendingState {
    /// Overwrite the destination.
    #[default]
    Disabled,
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    AlphaBlend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub blending: BlendingState,
    /// Back faces are culled unless clipping may expose them.
    pub cull_face: bool,
    pub depth_test: bool,
}

/// Clipping data bound in every pass of a clipped tile.
#[derive(Clone, Debug, PartialEq)]
pub struct ClippingUniforms {
    pub planes_texture: Option<TextureHandle>,
    pub plane_count: usize,
    pub union_clipping_regions: bool,
    pub edge_width: f64,
    pub edge_color: [f32; 4],
    pub polygon_positions_texture: Option<TextureHandle>,
    pub polygon_extents_texture: Option<TextureHandle>,
    pub polygon_count: usize,
    pub inverse_polygons: bool,
}

/// Imagery ready to sample for one tile binding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageryDraw {
    pub layer: LayerId,
    pub imagery: ImageryId,
    pub texture: TextureHandle,
    pub texture_coordinate_rectangle: DVec4,
    pub translation_and_scale: DVec4,
}

/// One texture sampled by a pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureBinding {
    pub layer: LayerId,
    pub imagery: ImageryId,
    pub texture: TextureHandle,
    pub texture_coordinate_rectangle: DVec4,
    pub translation_and_scale: DVec4,
    pub uniforms: LayerUniforms,
    /// Cutout in the tile's texture space as `(west, south, east, north)`.
    pub cutout_rectangle: Option<DVec4>,
}

/// A single draw of a tile.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawPass {
    pub tile: TileId,
    pub tile_key: TileKey,
    pub pass_index: usize,
    pub vertex_array: VertexArrayHandle,
    pub render_state: RenderState,
    /// Color the pass starts from before its textures are applied.
    pub initial_color: Color,
    pub textures: Vec<TextureBinding>,
    pub water_mask: Option<TextureHandle>,
    pub clipping: Option<ClippingUniforms>,
    pub clipped_by_boundaries: bool,
    pub requires_geodetic_normals: bool,
}

/// Everything about one tile the planner needs.
#[derive(Clone, Debug)]
pub struct TileDrawInput<'a> {
    pub tile: TileId,
    pub key: TileKey,
    pub rectangle: Rectangle,
    pub vertex_array: VertexArrayHandle,
    /// Bindings bottom layer first.
    pub imagery: &'a [ImageryDraw],
    pub water_mask: Option<TextureHandle>,
    pub partially_clipped: bool,
    pub clipped_by_boundaries: bool,
}

/// Frame-wide inputs to planning.
#[derive(Clone, Debug)]
pub struct DrawBatchPlanner {
    texture_units: usize,
    base_color: Color,
    requires_geodetic_normals: bool,
    clipping: Option<ClippingUniforms>,
}

impl DrawBatchPlanner {
    /// `texture_units` is the budget left for imagery; see
    /// [`effective_texture_units`](Self::effective_texture_units).
    pub fn new(texture_units: usize, base_color: Color) -> Self {
        Self {
            texture_units: texture_units.max(1),
            base_color,
            requires_geodetic_normals: false,
            clipping: None,
        }
    }

    pub fn with_geodetic_normals(mut self, required: bool) -> Self {
        self.requires_geodetic_normals = required;
        self
    }

    pub fn with_clipping(mut self, clipping: Option<ClippingUniforms>) -> Self {
        self.clipping = clipping;
        self
    }

    /// Hardware units minus those reserved for the water mask and clipping
    /// textures, never below one.
    pub fn effective_texture_units(
        maximum_texture_units: usize,
        water_mask: bool,
        clipping_planes: bool,
        clipping_polygons: bool,
    ) -> usize {
        let mut reserved = 0;
        if water_mask {
            reserved += WATER_MASK_TEXTURE_UNITS;
        }
        if clipping_planes {
            reserved += CLIPPING_PLANES_TEXTURE_UNITS;
        }
        if clipping_polygons {
            reserved += CLIPPING_POLYGONS_TEXTURE_UNITS;
        }
        maximum_texture_units.saturating_sub(reserved).max(1)
    }

    pub fn texture_units(&self) -> usize {
        self.texture_units
    }

    /// Passes for one tile, in draw order. Always at least one.
    pub fn plan_tile(&self, input: &TileDrawInput<'_>, layers: &LayerSnapshot) -> Vec<DrawPass> {
        let bindings: Vec<TextureBinding> = input
            .imagery
            .iter()
            .filter_map(|draw| {
                let layer = layers.get(draw.layer)?;
                if !layer.drawn {
                    return None;
                }
                Some(TextureBinding {
                    layer: draw.layer,
                    imagery: draw.imagery,
                    texture: draw.texture,
                    texture_coordinate_rectangle: draw.texture_coordinate_rectangle,
                    translation_and_scale: draw.translation_and_scale,
                    uniforms: layer.uniforms,
                    cutout_rectangle: layer
                        .cutout_rectangle
                        .and_then(|cutout| cutout_in_tile_space(&cutout, &input.rectangle)),
                })
            })
            .collect();

        let render_state = |pass_index: usize| RenderState {
            blending: if pass_index == 0 {
                BlendingState::Disabled
            } else {
                BlendingState::AlphaBlend
            },
            cull_face: !input.partially_clipped,
            depth_test: true,
        };
        let pass = |pass_index: usize, textures: Vec<TextureBinding>| DrawPass {
            tile: input.tile,
            tile_key: input.key,
            pass_index,
            vertex_array: input.vertex_array,
            render_state: render_state(pass_index),
            initial_color: if pass_index == 0 {
                self.base_color
            } else {
                Color::TRANSPARENT
            },
            textures,
            water_mask: input.water_mask,
            clipping: if input.partially_clipped {
                self.clipping.clone()
            } else {
                None
            },
            clipped_by_boundaries: input.clipped_by_boundaries,
            requires_geodetic_normals: self.requires_geodetic_normals,
        };

        if bindings.is_empty() {
            return vec![pass(0, Vec::new())];
        }
        bindings
            .chunks(self.texture_units)
            .enumerate()
            .map(|(index, chunk)| pass(index, chunk.to_vec()))
            .collect()
    }
}

/// Express `cutout` relative to `tile`, or `None` if they do not overlap.
fn cutout_in_tile_space(cutout: &Rectangle, tile: &Rectangle) -> Option<DVec4> {
    let overlap = cutout.intersection(tile)?;
    let width = tile.width();
    let height = tile.height();
    Some(DVec4::new(
        (overlap.west - tile.west) / width,
        (overlap.south - tile.south) / height,
        (overlap.east - tile.west) / width,
        (overlap.north - tile.south) / height,
    ))
}
