//! Quadtree terrain surface: tile selection by screen-space error, imagery
//! layer association, tile caching, clipping, and draw pass planning.

mod batch;
mod credits;
mod error;
mod frame;
mod load_queue;
mod options;
mod replacement_queue;
mod request;
mod resources;
mod selection;
mod statistics;
mod surface;
mod tile;
mod tile_arena;

pub mod clipping;
pub mod imagery;
pub mod provider;

pub use batch::{
    BlendingState, CLIPPING_PLANES_TEXTURE_UNITS, CLIPPING_POLYGONS_TEXTURE_UNITS, ClippingUniforms,
    DrawBatchPlanner, DrawPass, ImageryDraw, RenderState, TextureBinding, TileDrawInput, WATER_MASK_TEXTURE_UNITS,
};
pub use clipping::{
    ClipDecision, ClippingPlaneCollection, ClippingPolygon, ClippingPolygonCollection, SurfaceId,
};
pub use credits::CreditSet;
pub use error::{ConfigurationError, LoadFailure, LoadFailureKind};
pub use frame::{CameraState, Fog, FogState, FrameState, SceneMode};
pub use imagery::{ImageryLayer, ImageryLayerCollection, LayerId, SplitDirection, TileImagery};
pub use load_queue::{LoadPriority, TileLoadFactors, compute_load_priority};
pub use options::{Color, SurfaceOptions};
pub use provider::{Credit, ImageryProvider, TerrainData, TerrainProvider, WaterMask};
pub use request::Responder;
pub use resources::{HeadlessResources, RenderResources, TextureHandle, VertexArrayHandle};
pub use statistics::SurfaceStatistics;
pub use surface::{GlobeSurface, GlobeSurfaceBuilder};
pub use tile::{Tile, TileId, TileLoadState, TileSelectionResult};
