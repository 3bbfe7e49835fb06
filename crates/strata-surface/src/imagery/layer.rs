//! A single imagery layer and the per-frame view of the layer stack.

use std::sync::Arc;

use strata_geo::Rectangle;

use crate::imagery::ImageryCache;
use crate::provider::ImageryProvider;

/// Non-owning reference to an imagery layer.
///
/// Ids are never reused within a collection, so a tile binding whose layer
/// was removed simply fails to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// Which side of the split position a layer is drawn on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SplitDirection {
    Left,
    #[default]
    None,
    Right,
}

/// An ordered member of the imagery stack.
///
/// Appearance fields are public and may be edited freely through
/// [`crate::GlobeSurface::imagery_layer_mut`]; they take effect on the next
/// frame. Only `show` can touch tiles, see its docs.
pub struct ImageryLayer {
    provider: Arc<dyn ImageryProvider>,
    rectangle: Rectangle,
    minimum_terrain_level: Option<u32>,
    maximum_terrain_level: Option<u32>,
    pub alpha: f32,
    pub day_alpha: f32,
    pub night_alpha: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub hue: f32,
    pub saturation: f32,
    pub gamma: f32,
    /// Color made transparent, compared within `color_to_alpha_threshold`.
    pub color_to_alpha: Option<[f32; 3]>,
    pub color_to_alpha_threshold: f32,
    /// Region where this layer is not drawn.
    pub cutout_rectangle: Option<Rectangle>,
    pub split_direction: SplitDirection,
    /// Hidden layers get no tile entries. Entries are created on the first
    /// frame the layer is shown; hiding it again keeps them.
    pub show: bool,
    pub(crate) was_shown: bool,
    pub(crate) cache: ImageryCache,
}

impl ImageryLayer {
    pub fn new(provider: Arc<dyn ImageryProvider>) -> Self {
        let rectangle = provider.rectangle();
        Self {
            provider,
            rectangle,
            minimum_terrain_level: None,
            maximum_terrain_level: None,
            alpha: 1.0,
            day_alpha: 1.0,
            night_alpha: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            hue: 0.0,
            saturation: 1.0,
            gamma: 1.0,
            color_to_alpha: None,
            color_to_alpha_threshold: 0.004,
            cutout_rectangle: None,
            split_direction: SplitDirection::None,
            show: true,
            was_shown: false,
            cache: ImageryCache::new(),
        }
    }

    /// Restrict the layer to part of its provider's coverage.
    pub fn with_rectangle(mut self, rectangle: Rectangle) -> Self {
        self.rectangle = self.provider.rectangle().intersection(&rectangle).unwrap_or(rectangle);
        self
    }

    /// Only attach this layer to terrain tiles within `[minimum, maximum]`.
    pub fn with_terrain_level_range(mut self, minimum: Option<u32>, maximum: Option<u32>) -> Self {
        self.minimum_terrain_level = minimum;
        self.maximum_terrain_level = maximum;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn provider(&self) -> &Arc<dyn ImageryProvider> {
        &self.provider
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    /// Whether tiles at `level` receive imagery from this layer.
    pub fn covers_terrain_level(&self, level: u32) -> bool {
        self.minimum_terrain_level.is_none_or(|min| level >= min)
            && self.maximum_terrain_level.is_none_or(|max| level <= max)
    }

    /// Whether the layer contributes anything to a draw.
    pub fn is_drawn(&self) -> bool {
        self.show && self.alpha > 0.0
    }

    pub fn uniforms(&self) -> LayerUniforms {
        LayerUniforms {
            alpha: self.alpha,
            day_alpha: self.day_alpha,
            night_alpha: self.night_alpha,
            brightness: self.brightness,
            contrast: self.contrast,
            hue: self.hue,
            saturation: self.saturation,
            one_over_gamma: if self.gamma > 0.0 { 1.0 / self.gamma } else { 1.0 },
            color_to_alpha: self
                .color_to_alpha
                .map(|[r, g, b]| [r, g, b, self.color_to_alpha_threshold]),
            split_direction: self.split_direction,
        }
    }
}

impl std::fmt::Debug for ImageryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageryLayer")
            .field("rectangle", &self.rectangle)
            .field("alpha", &self.alpha)
            .field("show", &self.show)
            .field("cached_imagery", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Shader parameters for one texture binding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerUniforms {
    pub alpha: f32,
    pub day_alpha: f32,
    pub night_alpha: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub hue: f32,
    pub saturation: f32,
    pub one_over_gamma: f32,
    /// Key color in `rgb` and threshold in `a`.
    pub color_to_alpha: Option<[f32; 4]>,
    pub split_direction: SplitDirection,
}

/// One layer as seen by a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSnapshotEntry {
    pub id: LayerId,
    pub drawn: bool,
    pub uniforms: LayerUniforms,
    pub cutout_rectangle: Option<Rectangle>,
}

/// Immutable view of the layer stack, bottom first, taken once per frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerSnapshot {
    entries: Vec<LayerSnapshotEntry>,
}

impl LayerSnapshot {
    pub fn new(entries: Vec<LayerSnapshotEntry>) -> Self {
        Self { entries }
    }

    pub fn index_of(&self, layer: LayerId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == layer)
    }

    pub fn get(&self, layer: LayerId) -> Option<&LayerSnapshotEntry> {
        self.entries.iter().find(|entry| entry.id == layer)
    }

    pub fn order(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SingleTileImageryProvider;

    fn layer() -> ImageryLayer {
        ImageryLayer::new(Arc::new(SingleTileImageryProvider::solid([255, 0, 0, 255], 16, 16)))
    }

    #[test]
    fn test_defaults_are_neutral() {
        let layer = layer();
        let uniforms = layer.uniforms();
        assert_eq!(uniforms.alpha, 1.0);
        assert_eq!(uniforms.one_over_gamma, 1.0);
        assert_eq!(uniforms.color_to_alpha, None);
        assert!(layer.is_drawn());
    }

    #[test]
    fn test_hidden_or_transparent_layers_are_not_drawn() {
        let mut layer = layer();
        layer.show = false;
        assert!(!layer.is_drawn());
        layer.show = true;
        layer.alpha = 0.0;
        assert!(!layer.is_drawn());
    }

    #[test]
    fn test_terrain_level_range() {
        let layer = layer().with_terrain_level_range(Some(2), Some(5));
        assert!(!layer.covers_terrain_level(1));
        assert!(layer.covers_terrain_level(2));
        assert!(layer.covers_terrain_level(5));
        assert!(!layer.covers_terrain_level(6));
    }

    #[test]
    fn test_color_to_alpha_carries_threshold() {
        let mut layer = layer();
        layer.color_to_alpha = Some([1.0, 1.0, 1.0]);
        layer.color_to_alpha_threshold = 0.1;
        assert_eq!(layer.uniforms().color_to_alpha, Some([1.0, 1.0, 1.0, 0.1]));
    }
}
