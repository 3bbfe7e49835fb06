use glam::DVec4;

use crate::imagery::{ImageryId, LayerId};

/// One imagery layer's contribution to one terrain tile.
///
/// Exactly one of `ready` and `loading` is set at any time. While the
/// loading imagery is outstanding, `fallback` may point at an ancestor
/// imagery tile that is drawn in its place.
#[derive(Clone, Debug, PartialEq)]
pub struct TileImagery {
    pub(crate) layer: LayerId,
    pub(crate) ready: Option<ImageryId>,
    pub(crate) loading: Option<ImageryId>,
    pub(crate) fallback: Option<ImageryId>,
    /// Sub-region `(min_u, min_v, max_u, max_v)` of the terrain tile this
    /// imagery covers.
    pub(crate) texture_coordinate_rectangle: DVec4,
    /// Maps terrain texture coordinates into the drawn imagery tile.
    pub(crate) translation_and_scale: Option<DVec4>,
}

impl TileImagery {
    pub(crate) fn skeleton(layer: LayerId, imagery: ImageryId, texture_coordinate_rectangle: DVec4) -> Self {
        Self {
            layer,
            ready: None,
            loading: Some(imagery),
            fallback: None,
            texture_coordinate_rectangle,
            translation_and_scale: None,
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn ready_imagery(&self) -> Option<ImageryId> {
        self.ready
    }

    pub fn loading_imagery(&self) -> Option<ImageryId> {
        self.loading
    }

    pub fn fallback_imagery(&self) -> Option<ImageryId> {
        self.fallback
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    /// The imagery that would be sampled right now.
    pub fn drawable_imagery(&self) -> Option<ImageryId> {
        self.ready.or(self.fallback)
    }

    pub fn texture_coordinate_rectangle(&self) -> DVec4 {
        self.texture_coordinate_rectangle
    }

    pub fn translation_and_scale(&self) -> Option<DVec4> {
        self.translation_and_scale
    }
}
