//! Imagery layers and their association with terrain tiles.

mod association;
mod cache;
mod collection;
mod layer;
mod tile_imagery;

pub(crate) use association::{
    AssociationContext, begin_reload, insert_layer_entries, process_tile_imagery, remove_layer_entries,
    run_reload_callbacks, sort_entries_by_layer_order,
};
pub use cache::{ImageryId, ImageryState};
pub(crate) use cache::ImageryCache;
pub use collection::ImageryLayerCollection;
pub use layer::{ImageryLayer, LayerId, LayerSnapshot, LayerSnapshotEntry, LayerUniforms, SplitDirection};
pub use tile_imagery::TileImagery;
