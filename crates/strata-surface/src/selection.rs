//! Quadtree traversal choosing the tiles to draw this frame.
//!
//! Starting from the roots, a visible tile is drawn when its projected
//! error is small enough or it cannot be refined. Otherwise it is replaced
//! by its children, but only once every visible child can be drawn;
//! until then the tile stands in for them and the children are queued.

use glam::DVec3;
use strata_geo::{CullingVolume, Ellipsoid, HorizonOccluder, Intersect, Rectangle};

use crate::clipping::{ClipDecision, ClipDecisionEngine};
use crate::frame::{FogState, FrameState, SceneMode};
use crate::load_queue::{LoadPriority, LoadQueues, TileLoadFactors, compute_load_priority};
use crate::options::SurfaceOptions;
use crate::provider::TerrainProvider;
use crate::replacement_queue::TileReplacementQueue;
use crate::statistics::SurfaceStatistics;
use crate::tile::{Tile, TileId, TileSelectionResult};
use crate::tile_arena::TileArena;

/// Why a tile was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Visibility {
    Visible,
    Culled,
    CulledByClipping,
}

/// Visibility tests for one frame.
pub(crate) struct TileCuller<'a> {
    culling_volume: CullingVolume,
    occluder: Option<HorizonOccluder>,
    camera_position: DVec3,
    camera_direction: DVec3,
    camera_height: f64,
    fog: FogState,
    limit_rectangle: Rectangle,
    clip: &'a ClipDecisionEngine,
}

impl<'a> TileCuller<'a> {
    pub fn new(
        frame: &FrameState,
        ellipsoid: &Ellipsoid,
        fog: FogState,
        limit_rectangle: Rectangle,
        clip: &'a ClipDecisionEngine,
    ) -> Self {
        let camera = &frame.camera;
        let occluder = (frame.mode == SceneMode::Scene3D)
            .then(|| HorizonOccluder::new(camera.position, ellipsoid.minimum_radius()));
        Self {
            culling_volume: camera.culling_volume(),
            occluder,
            camera_position: camera.position,
            camera_direction: camera.direction,
            camera_height: camera.position_cartographic(ellipsoid).height,
            fog,
            limit_rectangle,
            clip,
        }
    }

    /// Classify `tile`, recording its distance and clip state on it.
    pub fn evaluate(&self, tile: &mut Tile) -> Visibility {
        tile.distance = self.distance_to(tile);

        if !tile.rectangle.intersects(&self.limit_rectangle) {
            return Visibility::Culled;
        }
        tile.clipped_by_boundaries = !self.limit_rectangle.contains_rectangle(&tile.rectangle);

        let sphere = &tile.bounding_sphere;
        if self.culling_volume.compute_visibility(sphere) == Intersect::Outside {
            return Visibility::Culled;
        }
        if let Some(occluder) = &self.occluder
            && !occluder.is_visible(sphere.center, sphere.radius)
        {
            return Visibility::Culled;
        }
        if self.fog.culls(tile.distance) {
            return Visibility::Culled;
        }

        tile.clip = self.clip.decide(sphere, &tile.rectangle);
        if tile.clip == ClipDecision::FullyCulled {
            return Visibility::CulledByClipping;
        }
        Visibility::Visible
    }

    fn distance_to(&self, tile: &Tile) -> f64 {
        let to_sphere = tile.bounding_sphere.distance_to(self.camera_position);
        to_sphere.max(self.camera_height - tile.max_height)
    }

    pub fn fog(&self) -> &FogState {
        &self.fog
    }

    /// Scheduling factors for a tile already evaluated this frame.
    pub fn load_factors(&self, tile: &Tile) -> TileLoadFactors {
        let to_tile = (tile.bounding_sphere.center - self.camera_position).normalize_or_zero();
        TileLoadFactors {
            distance: tile.distance,
            level: tile.key.level,
            in_frustum: self.culling_volume.compute_visibility(&tile.bounding_sphere) != Intersect::Outside,
            direction_dot: to_tile.dot(self.camera_direction),
        }
    }
}

/// Settings the traversal reads from the surface.
pub(crate) struct SelectionSettings<'a> {
    pub options: &'a SurfaceOptions,
    pub ellipsoid: Ellipsoid,
    pub frame_number: u64,
    pub viewport_height: u32,
    pub sse_denominator: f64,
}

/// One frame's traversal over the tile arena.
pub(crate) struct LodSelector<'a> {
    arena: &'a mut TileArena,
    replacement_queue: &'a mut TileReplacementQueue,
    load_queues: &'a mut LoadQueues,
    terrain: &'a dyn TerrainProvider,
    culler: &'a TileCuller<'a>,
    settings: SelectionSettings<'a>,
    stats: &'a mut SurfaceStatistics,
    rendered: Vec<TileId>,
}

impl<'a> LodSelector<'a> {
    pub fn new(
        arena: &'a mut TileArena,
        replacement_queue: &'a mut TileReplacementQueue,
        load_queues: &'a mut LoadQueues,
        terrain: &'a dyn TerrainProvider,
        culler: &'a TileCuller<'a>,
        settings: SelectionSettings<'a>,
        stats: &'a mut SurfaceStatistics,
    ) -> Self {
        Self {
            arena,
            replacement_queue,
            load_queues,
            terrain,
            culler,
            settings,
            stats,
            rendered: Vec::new(),
        }
    }

    /// Walk the quadtree and return the tiles to draw, in traversal order.
    pub fn select(mut self) -> Vec<TileId> {
        let roots = self.arena.roots().to_vec();
        for root in roots {
            self.touch(root);
            let renderable = self.arena.get(root).is_some_and(Tile::is_renderable);
            if !renderable {
                if let Some(tile) = self.arena.get_mut(root) {
                    self.culler.evaluate(tile);
                }
                self.queue(root, LoadPriority::High);
                continue;
            }
            self.visit_if_visible(root);
        }
        self.rendered
    }

    fn touch(&mut self, id: TileId) {
        self.replacement_queue.mark_tile_rendered(self.arena, id);
        if let Some(tile) = self.arena.get_mut(id) {
            tile.selection_frame = Some(self.settings.frame_number);
            tile.selection = TileSelectionResult::None;
        }
    }

    fn queue(&mut self, id: TileId, priority: LoadPriority) {
        let Some(tile) = self.arena.get(id) else {
            return;
        };
        if !tile.needs_loading() {
            return;
        }
        let score = compute_load_priority(&self.culler.load_factors(tile));
        self.load_queues.push(id, priority, score);
    }

    fn visit_if_visible(&mut self, id: TileId) {
        let Some(tile) = self.arena.get_mut(id) else {
            return;
        };
        self.stats.tiles_visited += 1;
        self.stats.max_depth_visited = self.stats.max_depth_visited.max(tile.key.level);
        match self.culler.evaluate(tile) {
            Visibility::Visible => self.visit(id),
            Visibility::Culled => {
                tile.selection = TileSelectionResult::Culled;
                self.stats.tiles_culled += 1;
            }
            Visibility::CulledByClipping => {
                tile.selection = TileSelectionResult::Culled;
                self.stats.tiles_culled_by_clipping += 1;
            }
        }
    }

    fn screen_space_error(&self, tile: &Tile) -> f64 {
        let geometric_error = self.terrain.level_maximum_geometric_error(tile.key.level);
        let error = geometric_error * f64::from(self.settings.viewport_height)
            / (tile.distance * self.settings.sse_denominator);
        self.culler.fog().attenuate(error, tile.distance)
    }

    /// Whether the tile may be replaced by children at all.
    fn can_refine(&self, tile: &Tile) -> bool {
        if tile.key.level >= self.terrain.maximum_level() {
            return false;
        }
        tile.key.children().iter().enumerate().all(|(index, child_key)| {
            let available = tile
                .child_available_from_data(index)
                .or_else(|| self.terrain.tile_data_available(*child_key));
            let failed = tile.children[index]
                .and_then(|child| self.arena.get(child))
                .is_some_and(Tile::has_failed);
            available != Some(false) && !failed
        })
    }

    fn visit(&mut self, id: TileId) {
        let Some(tile) = self.arena.get(id) else {
            return;
        };
        let error = self.screen_space_error(tile);
        if error <= self.settings.options.maximum_screen_space_error || !self.can_refine(tile) {
            if let Some(tile) = self.arena.get_mut(id) {
                tile.fallback_since = None;
            }
            self.render(id);
            return;
        }

        let children = self.ensure_children(id);
        let mut visible = Vec::with_capacity(4);
        let mut blocking = Vec::new();
        for child in children {
            self.touch(child);
            let Some(child_tile) = self.arena.get_mut(child) else {
                continue;
            };
            match self.culler.evaluate(child_tile) {
                Visibility::Visible => {
                    if !child_tile.is_renderable() {
                        blocking.push(child);
                    }
                    visible.push(child);
                }
                Visibility::Culled => {
                    child_tile.selection = TileSelectionResult::Culled;
                    self.stats.tiles_culled += 1;
                }
                Visibility::CulledByClipping => {
                    child_tile.selection = TileSelectionResult::Culled;
                    self.stats.tiles_culled_by_clipping += 1;
                }
            }
        }

        if blocking.is_empty() {
            if let Some(tile) = self.arena.get_mut(id) {
                tile.selection = TileSelectionResult::Refined;
                tile.fallback_since = None;
            }
            if self.settings.options.preload_ancestors {
                self.queue(id, LoadPriority::Low);
            }
            for child in visible {
                self.stats.tiles_visited += 1;
                if let Some(child_tile) = self.arena.get(child) {
                    self.stats.max_depth_visited = self.stats.max_depth_visited.max(child_tile.key.level);
                }
                self.visit(child);
            }
            return;
        }

        // Stand in for the children until all of them can be drawn.
        let frame = self.settings.frame_number;
        let since = self
            .arena
            .get_mut(id)
            .map(|tile| *tile.fallback_since.get_or_insert(frame))
            .unwrap_or(frame);
        let stale = frame.saturating_sub(since) > self.settings.options.max_fallback_frames;
        let priority = if stale {
            self.stats.stale_fallbacks += 1;
            LoadPriority::High
        } else {
            LoadPriority::Medium
        };
        self.stats.tiles_waiting_for_children += 1;
        self.render(id);
        for child in blocking {
            self.queue(child, priority);
        }
    }

    fn render(&mut self, id: TileId) {
        let Some(tile) = self.arena.get_mut(id) else {
            return;
        };
        tile.selection = TileSelectionResult::Rendered;
        self.stats.tiles_rendered += 1;
        self.stats.max_depth_rendered = self.stats.max_depth_rendered.max(tile.key.level);
        self.rendered.push(id);
        self.queue(id, LoadPriority::Medium);
    }

    /// Create any missing children and return all four, north-west first.
    fn ensure_children(&mut self, id: TileId) -> Vec<TileId> {
        let Some(tile) = self.arena.get(id) else {
            return Vec::new();
        };
        let existing = tile.children;
        let child_keys = tile.key.children();
        let scheme = self.terrain.tiling_scheme();
        let options = self.settings.options;

        let mut children = Vec::with_capacity(4);
        for (index, key) in child_keys.into_iter().enumerate() {
            if let Some(child) = existing[index].filter(|child| self.arena.contains(*child)) {
                children.push(child);
                continue;
            }
            let mut child = Tile::new(
                key,
                scheme.tile_xy_to_rectangle(key),
                Some(id),
                self.terrain.approximate_height_range(key),
            );
            child.update_bounds(
                &self.settings.ellipsoid,
                options.vertical_exaggeration,
                options.vertical_exaggeration_relative_height,
            );
            let child_id = self.arena.insert(child);
            if let Some(parent) = self.arena.get_mut(id) {
                parent.children[index] = Some(child_id);
            }
            children.push(child_id);
        }
        children
    }
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
