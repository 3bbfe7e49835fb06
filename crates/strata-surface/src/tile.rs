//! Quadtree tiles and their load lifecycle.

use strata_geo::{BoundingSphere, Ellipsoid, Rectangle, TileKey};

use crate::clipping::ClipDecision;
use crate::error::LoadFailure;
use crate::imagery::{LayerId, TileImagery};
use crate::provider::TerrainData;
use crate::resources::{TextureHandle, VertexArrayHandle};

/// Stable handle to a tile in the surface's arena.
///
/// The generation changes whenever a slot is reused, so a handle kept past
/// its tile's eviction never resolves to the tile that replaced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileId {
    index: u32,
    generation: u32,
}

impl TileId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

/// Coarse load state of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileLoadState {
    /// Created but never processed by the load queue.
    Start,
    /// Terrain or at least one imagery layer is still pending.
    Loading,
    /// Terrain and every imagery layer have settled.
    Done,
    /// Terrain could not be loaded. The tile is a permanent leaf.
    Failed,
}

/// What the last traversal decided about a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileSelectionResult {
    #[default]
    None,
    Culled,
    Rendered,
    Refined,
}

/// Terrain side of the tile lifecycle.
#[derive(Debug)]
pub(crate) enum TerrainState {
    Unloaded,
    Requested,
    Received(Box<TerrainData>),
    Ready(TerrainRenderData),
    Failed(LoadFailure),
}

/// GPU-side terrain owned by a ready tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TerrainRenderData {
    pub vertex_array: VertexArrayHandle,
    pub water_mask: Option<TextureHandle>,
    pub child_tile_mask: u8,
}

/// A pending "swap in the reloaded imagery" action for one layer.
///
/// `stale_entries` counts the tile's old entries for the layer that the
/// reload is replacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ReloadCallback {
    pub layer: LayerId,
    pub stale_entries: usize,
}

/// Apply vertical exaggeration to a height.
pub(crate) fn exaggerate_height(height: f64, exaggeration: f64, relative_height: f64) -> f64 {
    (height - relative_height) * exaggeration + relative_height
}

/// One node of the terrain quadtree.
#[derive(Debug)]
pub struct Tile {
    pub(crate) key: TileKey,
    pub(crate) rectangle: Rectangle,
    pub(crate) parent: Option<TileId>,
    pub(crate) children: [Option<TileId>; 4],
    pub(crate) state: TileLoadState,
    pub(crate) terrain: TerrainState,
    pub(crate) imagery: Vec<TileImagery>,
    pub(crate) reload_callbacks: Vec<ReloadCallback>,
    pub(crate) min_height: f64,
    pub(crate) max_height: f64,
    pub(crate) bounding_sphere: BoundingSphere,
    pub(crate) distance: f64,
    pub(crate) clip: ClipDecision,
    pub(crate) clipped_by_boundaries: bool,
    pub(crate) selection: TileSelectionResult,
    pub(crate) selection_frame: Option<u64>,
    /// First frame of the current uninterrupted run of rendering this tile
    /// in place of children that are still loading.
    pub(crate) fallback_since: Option<u64>,
    pub(crate) replacement_previous: Option<TileId>,
    pub(crate) replacement_next: Option<TileId>,
}

impl Tile {
    pub(crate) fn new(
        key: TileKey,
        rectangle: Rectangle,
        parent: Option<TileId>,
        height_range: (f64, f64),
    ) -> Self {
        Self {
            key,
            rectangle,
            parent,
            children: [None; 4],
            state: TileLoadState::Start,
            terrain: TerrainState::Unloaded,
            imagery: Vec::new(),
            reload_callbacks: Vec::new(),
            min_height: height_range.0,
            max_height: height_range.1,
            bounding_sphere: BoundingSphere::new(glam::DVec3::ZERO, 0.0),
            distance: f64::MAX,
            clip: ClipDecision::Unclipped,
            clipped_by_boundaries: false,
            selection: TileSelectionResult::None,
            selection_frame: None,
            fallback_since: None,
            replacement_previous: None,
            replacement_next: None,
        }
    }

    /// Recompute the bounding sphere from the current height range.
    pub(crate) fn update_bounds(&mut self, ellipsoid: &Ellipsoid, exaggeration: f64, relative_height: f64) {
        let min = exaggerate_height(self.min_height, exaggeration, relative_height);
        let max = exaggerate_height(self.max_height, exaggeration, relative_height);
        self.bounding_sphere = BoundingSphere::from_rectangle(&self.rectangle, ellipsoid, min.min(max), min.max(max));
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn rectangle(&self) -> &Rectangle {
        &self.rectangle
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    /// Children in northwest, northeast, southwest, southeast order. A slot
    /// is empty until the tile is first refined or after the child is evicted.
    pub fn children(&self) -> [Option<TileId>; 4] {
        self.children
    }

    pub fn state(&self) -> TileLoadState {
        self.state
    }

    /// A tile can be drawn once its terrain is ready, whatever the state of
    /// its imagery.
    pub fn is_renderable(&self) -> bool {
        matches!(self.terrain, TerrainState::Ready(_))
    }

    pub fn has_failed(&self) -> bool {
        self.state == TileLoadState::Failed
    }

    pub fn terrain_failure(&self) -> Option<&LoadFailure> {
        match &self.terrain {
            TerrainState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Per-layer imagery bindings, bottom layer first.
    pub fn imagery(&self) -> &[TileImagery] {
        &self.imagery
    }

    /// Number of imagery entries bound to `layer`.
    pub fn imagery_count_for(&self, layer: LayerId) -> usize {
        self.imagery.iter().filter(|entry| entry.layer() == layer).count()
    }

    /// Number of pending reload swaps registered for `layer`.
    pub fn reload_callback_count(&self, layer: LayerId) -> usize {
        self.reload_callbacks.iter().filter(|cb| cb.layer == layer).count()
    }

    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.bounding_sphere
    }

    /// Height bounds in meters, before exaggeration.
    pub fn height_range(&self) -> (f64, f64) {
        (self.min_height, self.max_height)
    }

    pub fn clip_decision(&self) -> ClipDecision {
        self.clip
    }

    /// `true` when the tile straddles a clipping boundary and needs
    /// per-fragment clipping.
    pub fn is_clipped(&self) -> bool {
        self.clip == ClipDecision::PartiallyClipped
    }

    /// Distance from the camera used for the last screen-space error.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn last_selection(&self) -> TileSelectionResult {
        self.selection
    }

    pub(crate) fn vertex_array(&self) -> Option<VertexArrayHandle> {
        match &self.terrain {
            TerrainState::Ready(render) => Some(render.vertex_array),
            _ => None,
        }
    }

    pub(crate) fn water_mask(&self) -> Option<TextureHandle> {
        match &self.terrain {
            TerrainState::Ready(render) => render.water_mask,
            _ => None,
        }
    }

    /// Whether the loaded terrain says child `index` has its own data.
    /// Unknown until the terrain is ready.
    pub(crate) fn child_available_from_data(&self, index: usize) -> Option<bool> {
        match &self.terrain {
            TerrainState::Ready(render) => Some(render.child_tile_mask & (1 << index) != 0),
            _ => None,
        }
    }

    pub(crate) fn needs_loading(&self) -> bool {
        matches!(self.state, TileLoadState::Start | TileLoadState::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tile_starts_unloaded() {
        let key = TileKey::new(0, 0, 0);
        let tile = Tile::new(key, Rectangle::MAX_VALUE, None, (0.0, 0.0));
        assert_eq!(tile.state(), TileLoadState::Start);
        assert!(!tile.is_renderable());
        assert!(tile.needs_loading());
        assert_eq!(tile.children(), [None; 4]);
    }

    #[test]
    fn test_exaggeration_about_relative_height() {
        assert_eq!(exaggerate_height(100.0, 2.0, 0.0), 200.0);
        assert_eq!(exaggerate_height(100.0, 2.0, 50.0), 150.0);
        assert_eq!(exaggerate_height(100.0, 1.0, 50.0), 100.0);
    }

    #[test]
    fn test_exaggeration_grows_bounds() {
        let ellipsoid = Ellipsoid::WGS84;
        let rect = Rectangle::from_degrees(0.0, 0.0, 1.0, 1.0);
        let mut tile = Tile::new(TileKey::new(8, 0, 0), rect, None, (0.0, 5000.0));
        tile.update_bounds(&ellipsoid, 1.0, 0.0);
        let plain = tile.bounding_sphere().radius;
        tile.update_bounds(&ellipsoid, 4.0, 0.0);
        assert!(tile.bounding_sphere().radius > plain);
    }
}
