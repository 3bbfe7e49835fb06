//! The surface tile provider.
//!
//! [`GlobeSurface`] owns the quadtree, the imagery layer stack and every
//! backend resource created for them. Each call to [`GlobeSurface::update`]
//! runs one frame:
//!
//! 1. apply provider results delivered since the last frame,
//! 2. select the tiles to draw (visibility, clip decision, refinement),
//! 3. evict tiles not touched this frame beyond the cache size,
//! 4. advance terrain and imagery loads within the frame budget,
//! 5. plan the draw passes for the selected tiles.
//!
//! All mutation happens on the caller's thread. Providers only ever talk to
//! the surface through [`Responder`](crate::Responder)s.

use std::sync::Arc;
use std::time::Instant;

use image::{GrayImage, Luma};
use strata_geo::{Ellipsoid, Rectangle};
use tracing::{debug, info, trace, warn};

use crate::batch::{ClippingUniforms, DrawBatchPlanner, DrawPass, ImageryDraw, TileDrawInput};
use crate::clipping::{
    ClipDecisionEngine, ClippingPlaneCollection, ClippingPolygonCollection, PlaneSnapshot, PolygonSnapshot, SurfaceId,
};
use crate::credits::CreditSet;
use crate::error::{ConfigurationError, LoadFailure, LoadFailureKind};
use crate::frame::FrameState;
use crate::imagery::{
    AssociationContext, ImageryLayer, ImageryLayerCollection, ImageryState, LayerId, begin_reload,
    insert_layer_entries, process_tile_imagery, remove_layer_entries, run_reload_callbacks,
    sort_entries_by_layer_order,
};
use crate::load_queue::LoadQueues;
use crate::options::{Color, SurfaceOptions, validate_exaggeration, validate_limit_rectangle};
use crate::provider::{TerrainData, TerrainProvider, WaterMask};
use crate::replacement_queue::TileReplacementQueue;
use crate::request::{Completion, CompletionQueue, ImageryToken, TerrainToken};
use crate::resources::{HeadlessResources, RenderResources, TextureHandle};
use crate::selection::{LodSelector, SelectionSettings, TileCuller};
use crate::statistics::SurfaceStatistics;
use crate::tile::{TerrainRenderData, TerrainState, Tile, TileId, TileLoadState};
use crate::tile_arena::TileArena;

/// What happened to a provider result drained at the start of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompletionOutcome {
    Applied,
    /// The tile, imagery, layer or terrain provider it was issued for is
    /// gone, or the request was already settled.
    StaleDiscarded,
}

fn rejected(error: ConfigurationError) -> ConfigurationError {
    warn!(%error, "surface configuration rejected");
    error
}

/// A plane collection attached to this surface and the texture encoding it.
#[derive(Debug)]
struct AttachedPlanes {
    collection: ClippingPlaneCollection,
    texture: Option<TextureHandle>,
    /// Collection version the texture was built from.
    version: Option<u64>,
}

#[derive(Debug)]
struct AttachedPolygons {
    collection: ClippingPolygonCollection,
    positions_texture: Option<TextureHandle>,
    extents_texture: Option<TextureHandle>,
    version: Option<u64>,
}

/// Pad packed floats to whole RGBA texels and upload them, one row.
fn upload_texels(resources: &mut dyn RenderResources, mut values: Vec<f32>) -> TextureHandle {
    let texels = values.len().div_ceil(4).max(1);
    values.resize(texels * 4, 0.0);
    resources.create_data_texture(&values, texels as u32)
}

/// Release everything a removed tile owned.
fn release_tile(tile: Tile, layers: &mut ImageryLayerCollection, resources: &mut dyn RenderResources) {
    let mut tile = tile;
    if let TerrainState::Ready(render) = &tile.terrain {
        resources.release_vertex_array(render.vertex_array);
        if let Some(mask) = render.water_mask {
            resources.release_texture(mask);
        }
    }
    let layer_ids: Vec<LayerId> = tile.imagery.iter().map(|entry| entry.layer()).collect();
    for layer_id in layer_ids {
        if let Some(layer) = layers.get_mut(layer_id) {
            remove_layer_entries(&mut tile, layer_id, &mut layer.cache, resources);
        }
    }
}

/// Upload terrain that arrived for a tile and make the tile drawable.
fn build_terrain(
    tile: &mut Tile,
    data: &TerrainData,
    ellipsoid: &Ellipsoid,
    options: &SurfaceOptions,
    resources: &mut dyn RenderResources,
) -> TerrainRenderData {
    let (min_height, max_height) = data.height_range();
    tile.min_height = min_height;
    tile.max_height = max_height;
    tile.update_bounds(
        ellipsoid,
        options.vertical_exaggeration,
        options.vertical_exaggeration_relative_height,
    );

    let vertex_array = resources.create_vertex_array(tile.key, data);
    let water_mask = match &data.water_mask {
        Some(WaterMask::Grid(mask)) => Some(resources.create_mask_texture(mask)),
        Some(WaterMask::Uniform { water: true }) => {
            Some(resources.create_mask_texture(&GrayImage::from_pixel(1, 1, Luma([255]))))
        }
        Some(WaterMask::Uniform { water: false }) | None => None,
    };
    TerrainRenderData {
        vertex_array,
        water_mask,
        child_tile_mask: data.child_tile_mask,
    }
}

/// A quadtree terrain surface draped with ordered imagery layers.
///
/// Build one with [`GlobeSurface::builder`], then call
/// [`update`](Self::update) once per frame and hand the returned draw passes
/// to the graphics backend.
pub struct GlobeSurface<R: RenderResources = HeadlessResources> {
    id: SurfaceId,
    ellipsoid: Ellipsoid,
    terrain: Arc<dyn TerrainProvider>,
    /// Bumped on every terrain provider change; terrain results tagged with
    /// an older epoch are discarded.
    terrain_epoch: u64,
    layers: ImageryLayerCollection,
    arena: TileArena,
    replacement_queue: TileReplacementQueue,
    load_queues: LoadQueues,
    completions: CompletionQueue,
    resources: R,
    options: SurfaceOptions,
    clipping_planes: Option<AttachedPlanes>,
    clipping_polygons: Option<AttachedPolygons>,
    rendered: Vec<TileId>,
    draw_passes: Vec<DrawPass>,
    credits: CreditSet,
    /// Whether terrain was drawn and which layers contributed at the last
    /// credit computation.
    credited: Option<(bool, Vec<LayerId>)>,
    statistics: SurfaceStatistics,
}

/// Assembles a [`GlobeSurface`].
///
/// A terrain provider and render resources are required. Options default to
/// [`SurfaceOptions::default`].
pub struct GlobeSurfaceBuilder<R: RenderResources = HeadlessResources> {
    terrain: Option<Arc<dyn TerrainProvider>>,
    resources: Option<R>,
    options: SurfaceOptions,
    layers: Vec<ImageryLayer>,
}

impl<R: RenderResources> Default for GlobeSurfaceBuilder<R> {
    fn default() -> Self {
        Self {
            terrain: None,
            resources: None,
            options: SurfaceOptions::default(),
            layers: Vec::new(),
        }
    }
}

impl<R: RenderResources> GlobeSurfaceBuilder<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terrain_provider(mut self, provider: Arc<dyn TerrainProvider>) -> Self {
        self.terrain = Some(provider);
        self
    }

    pub fn resources(mut self, resources: R) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn options(mut self, options: SurfaceOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a layer on top of those added so far.
    pub fn imagery_layer(mut self, layer: ImageryLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn build(self) -> Result<GlobeSurface<R>, ConfigurationError> {
        let terrain = self
            .terrain
            .ok_or(ConfigurationError::MissingDependency("terrain_provider"))
            .map_err(rejected)?;
        let resources = self
            .resources
            .ok_or(ConfigurationError::MissingDependency("render_resources"))
            .map_err(rejected)?;
        self.options.validate().map_err(rejected)?;

        let mut layers = ImageryLayerCollection::new();
        for layer in self.layers {
            layers.add(layer);
        }

        let mut surface = GlobeSurface {
            id: SurfaceId::next(),
            ellipsoid: *terrain.tiling_scheme().ellipsoid(),
            terrain,
            terrain_epoch: 0,
            layers,
            arena: TileArena::new(),
            replacement_queue: TileReplacementQueue::new(),
            load_queues: LoadQueues::new(),
            completions: CompletionQueue::new(),
            resources,
            options: self.options,
            clipping_planes: None,
            clipping_polygons: None,
            rendered: Vec::new(),
            draw_passes: Vec::new(),
            credits: CreditSet::new(),
            credited: None,
            statistics: SurfaceStatistics::default(),
        };
        surface.create_level_zero_tiles();
        debug!(
            surface = ?surface.id,
            roots = surface.arena.roots().len(),
            layers = surface.layers.len(),
            "surface created"
        );
        Ok(surface)
    }
}

impl<R: RenderResources> GlobeSurface<R> {
    pub fn builder() -> GlobeSurfaceBuilder<R> {
        GlobeSurfaceBuilder::new()
    }

    /// Run one frame and return the draw passes for it, in draw order.
    pub fn update(&mut self, frame: &FrameState) -> &[DrawPass] {
        let previous_statistics = std::mem::take(&mut self.statistics);
        let mut stats = SurfaceStatistics::default();

        for completion in self.completions.drain() {
            if self.apply_completion(completion, &mut stats) == CompletionOutcome::StaleDiscarded {
                stats.stale_completions_discarded += 1;
            }
        }

        self.attach_newly_shown_layers();
        self.load_queues.clear();
        self.replacement_queue.mark_start_of_render_frame();

        let plane_snapshot = self.clipping_planes.as_ref().map(|attached| attached.collection.snapshot());
        let polygon_snapshot = self
            .clipping_polygons
            .as_ref()
            .map(|attached| attached.collection.snapshot());
        self.refresh_clipping_textures(plane_snapshot.as_ref(), polygon_snapshot.as_ref());
        let clip = ClipDecisionEngine::new(plane_snapshot, polygon_snapshot);

        let fog = self.options.fog.frame_state(&frame.camera, &self.ellipsoid, frame.mode);
        let culler = TileCuller::new(frame, &self.ellipsoid, fog, self.options.cartographic_limit_rectangle, &clip);
        let settings = SelectionSettings {
            options: &self.options,
            ellipsoid: self.ellipsoid,
            frame_number: frame.frame_number,
            viewport_height: frame.viewport_height,
            sse_denominator: frame.camera.frustum.sse_denominator(),
        };
        self.rendered = LodSelector::new(
            &mut self.arena,
            &mut self.replacement_queue,
            &mut self.load_queues,
            self.terrain.as_ref(),
            &culler,
            settings,
            &mut stats,
        )
        .select();

        let (high, medium, low) = self.load_queues.lengths();
        stats.load_queue_high = high;
        stats.load_queue_medium = medium;
        stats.load_queue_low = low;

        stats.tiles_evicted = self.trim_tiles();
        self.process_load_queue(&mut stats);

        self.plan_draw_passes(&clip, &mut stats);
        self.update_credits();

        stats.tiles_in_cache = self.replacement_queue.len();
        if stats.differs_in_shape(&previous_statistics) {
            debug!(
                frame = frame.frame_number,
                rendered = stats.tiles_rendered,
                culled = stats.tiles_culled,
                waiting = stats.tiles_waiting_for_children,
                max_depth = stats.max_depth_rendered,
                cached = stats.tiles_in_cache,
                passes = stats.draw_passes,
                "surface frame"
            );
        }
        self.statistics = stats;
        &self.draw_passes
    }

    fn apply_completion(&mut self, completion: Completion, stats: &mut SurfaceStatistics) -> CompletionOutcome {
        match completion {
            Completion::Terrain(token, result) => self.apply_terrain(token, result, stats),
            Completion::Imagery(token, result) => self.apply_imagery(token, result, stats),
        }
    }

    fn apply_terrain(
        &mut self,
        token: TerrainToken,
        result: Result<TerrainData, LoadFailure>,
        stats: &mut SurfaceStatistics,
    ) -> CompletionOutcome {
        let tile = if token.provider_epoch == self.terrain_epoch {
            self.arena.get_mut(token.tile)
        } else {
            None
        };
        let Some(tile) = tile.filter(|tile| matches!(tile.terrain, TerrainState::Requested)) else {
            trace!(tile = ?token.tile, epoch = token.provider_epoch, "discarded stale terrain result");
            return CompletionOutcome::StaleDiscarded;
        };

        match result {
            Ok(data) => tile.terrain = TerrainState::Received(Box::new(data)),
            Err(failure) if failure.kind == LoadFailureKind::Cancelled => tile.terrain = TerrainState::Unloaded,
            Err(failure) => {
                warn!(tile = %tile.key, error = %failure, "terrain load failed");
                stats.load_failures += 1;
                tile.terrain = TerrainState::Failed(failure);
                tile.state = TileLoadState::Failed;
            }
        }
        CompletionOutcome::Applied
    }

    fn apply_imagery(
        &mut self,
        token: ImageryToken,
        result: Result<image::RgbaImage, LoadFailure>,
        stats: &mut SurfaceStatistics,
    ) -> CompletionOutcome {
        let imagery = self
            .layers
            .get_mut(token.layer)
            .and_then(|layer| layer.cache.get_mut(token.imagery))
            .filter(|imagery| imagery.state == ImageryState::Transitioning);
        let Some(imagery) = imagery else {
            trace!(layer = ?token.layer, imagery = ?token.imagery, "discarded stale imagery result");
            return CompletionOutcome::StaleDiscarded;
        };

        match result {
            Ok(image) => {
                imagery.image = Some(image);
                imagery.state = ImageryState::Received;
            }
            Err(failure) if failure.kind == LoadFailureKind::Cancelled => imagery.state = ImageryState::Unloaded,
            Err(failure) => {
                warn!(layer = ?token.layer, imagery = %imagery.key, error = %failure, "imagery load failed");
                stats.load_failures += 1;
                imagery.state = if failure.kind == LoadFailureKind::NotFound {
                    ImageryState::Invalid
                } else {
                    ImageryState::Failed
                };
                imagery.failure = Some(failure);
            }
        }
        CompletionOutcome::Applied
    }

    /// Evict tiles not touched this frame until the cache fits. Level-zero
    /// tiles are never evicted.
    fn trim_tiles(&mut self) -> usize {
        let layers = &mut self.layers;
        let resources = &mut self.resources;
        let load_queues = &mut self.load_queues;
        let mut released = 0;
        self.replacement_queue
            .trim_tiles(&mut self.arena, self.options.tile_cache_size, |queue, arena, id| {
                if arena.get(id).is_none_or(|tile| tile.parent.is_none()) {
                    return false;
                }
                for descendant in arena.subtree_ids(id) {
                    queue.remove(arena, descendant);
                    load_queues.remove(descendant);
                }
                for tile in arena.remove_subtree(id) {
                    trace!(tile = %tile.key, "evicted tile");
                    release_tile(tile, layers, &mut *resources);
                    released += 1;
                }
                true
            });
        released
    }

    fn process_load_queue(&mut self, stats: &mut SurfaceStatistics) {
        let deadline = Instant::now() + self.options.load_queue_time_slice;
        while stats.tiles_processed < self.options.max_tile_loads_per_frame {
            let Some((id, _)) = self.load_queues.pop() else {
                break;
            };
            self.process_tile(id, stats);
            stats.tiles_processed += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
    }

    /// Advance one tile's terrain and imagery by one step each.
    fn process_tile(&mut self, id: TileId, stats: &mut SurfaceStatistics) {
        let order = self.layers.order();
        let terrain = Arc::clone(&self.terrain);
        let Some(tile) = self.arena.get_mut(id) else {
            return;
        };

        if tile.state == TileLoadState::Start {
            for layer_id in &order {
                if let Some(layer) = self.layers.get_mut(*layer_id).filter(|layer| layer.show) {
                    insert_layer_entries(tile, *layer_id, layer, &order, terrain.as_ref());
                }
            }
            tile.state = TileLoadState::Loading;
        }

        match std::mem::replace(&mut tile.terrain, TerrainState::Requested) {
            TerrainState::Unloaded => {
                stats.terrain_requests += 1;
                let responder = self.completions.terrain_responder(TerrainToken {
                    tile: id,
                    provider_epoch: self.terrain_epoch,
                });
                if let Err(responder) = terrain.request_tile(tile.key, responder) {
                    responder.disarm();
                    stats.throttled_requests += 1;
                    tile.terrain = TerrainState::Unloaded;
                }
            }
            TerrainState::Received(data) => {
                let render = build_terrain(tile, &data, &self.ellipsoid, &self.options, &mut self.resources);
                tile.terrain = TerrainState::Ready(render);
            }
            other => tile.terrain = other,
        }

        let mut ctx = AssociationContext {
            completions: &self.completions,
            resources: &mut self.resources,
            stats,
        };
        let imagery_done = process_tile_imagery(tile, &mut self.layers, &mut ctx);
        let terrain_done = matches!(tile.terrain, TerrainState::Ready(_) | TerrainState::Failed(_));

        if terrain_done && imagery_done {
            run_reload_callbacks(tile, &mut self.layers, terrain.as_ref(), &mut self.resources);
            if tile.reload_callbacks.is_empty() && tile.state == TileLoadState::Loading {
                tile.state = TileLoadState::Done;
            }
        }
    }

    /// Rebuild clipping textures whose collection changed since they were
    /// uploaded.
    fn refresh_clipping_textures(&mut self, planes: Option<&PlaneSnapshot>, polygons: Option<&PolygonSnapshot>) {
        if let (Some(attached), Some(snapshot)) = (self.clipping_planes.as_mut(), planes)
            && attached.version != Some(snapshot.version)
        {
            if let Some(texture) = attached.texture.take() {
                self.resources.release_texture(texture);
            }
            if snapshot.is_active() {
                attached.texture = Some(upload_texels(&mut self.resources, snapshot.packed()));
            }
            attached.version = Some(snapshot.version);
        }

        if let (Some(attached), Some(snapshot)) = (self.clipping_polygons.as_mut(), polygons)
            && attached.version != Some(snapshot.version)
        {
            for texture in [attached.positions_texture.take(), attached.extents_texture.take()]
                .into_iter()
                .flatten()
            {
                self.resources.release_texture(texture);
            }
            if snapshot.is_active() {
                attached.positions_texture = Some(upload_texels(&mut self.resources, snapshot.packed_positions()));
                attached.extents_texture = Some(upload_texels(&mut self.resources, snapshot.packed_extents()));
            }
            attached.version = Some(snapshot.version);
        }
    }

    fn clipping_uniforms(&self, clip: &ClipDecisionEngine) -> Option<ClippingUniforms> {
        if !clip.is_active() {
            return None;
        }
        let planes = clip.planes();
        let polygons = clip.polygons();
        Some(ClippingUniforms {
            planes_texture: planes.and(self.clipping_planes.as_ref()).and_then(|attached| attached.texture),
            plane_count: planes.map_or(0, |snapshot| snapshot.planes.len()),
            union_clipping_regions: planes.is_some_and(|snapshot| snapshot.union_clipping_regions),
            edge_width: planes.map_or(0.0, |snapshot| snapshot.edge_width),
            edge_color: planes.map_or([1.0; 4], |snapshot| snapshot.edge_color),
            polygon_positions_texture: polygons
                .and(self.clipping_polygons.as_ref())
                .and_then(|attached| attached.positions_texture),
            polygon_extents_texture: polygons
                .and(self.clipping_polygons.as_ref())
                .and_then(|attached| attached.extents_texture),
            polygon_count: polygons.map_or(0, |snapshot| snapshot.polygons.len()),
            inverse_polygons: polygons.is_some_and(|snapshot| snapshot.inverse),
        })
    }

    fn plan_draw_passes(&mut self, clip: &ClipDecisionEngine, stats: &mut SurfaceStatistics) {
        let layer_snapshot = self.layers.snapshot();
        let water = self.options.show_water_effect && self.terrain.has_water_mask();
        let units = DrawBatchPlanner::effective_texture_units(
            self.resources.maximum_texture_image_units(),
            water,
            clip.planes().is_some(),
            clip.polygons().is_some(),
        );
        let planner = DrawBatchPlanner::new(units, self.options.base_color.unwrap_or(Color::BLUE))
            .with_geodetic_normals(self.options.vertical_exaggeration != 1.0)
            .with_clipping(self.clipping_uniforms(clip));

        self.draw_passes.clear();
        let mut draws = Vec::new();
        for &id in &self.rendered {
            let Some(tile) = self.arena.get(id) else {
                continue;
            };
            let Some(vertex_array) = tile.vertex_array() else {
                continue;
            };

            draws.clear();
            for entry in tile.imagery() {
                let Some(imagery) = entry.drawable_imagery() else {
                    continue;
                };
                let Some(translation_and_scale) = entry.translation_and_scale() else {
                    continue;
                };
                let texture = self
                    .layers
                    .get(entry.layer())
                    .and_then(|layer| layer.cache.get(imagery))
                    .and_then(|imagery| imagery.texture);
                let Some(texture) = texture else {
                    continue;
                };
                draws.push(ImageryDraw {
                    layer: entry.layer(),
                    imagery,
                    texture,
                    texture_coordinate_rectangle: entry.texture_coordinate_rectangle(),
                    translation_and_scale,
                });
            }

            let input = TileDrawInput {
                tile: id,
                key: tile.key,
                rectangle: tile.rectangle,
                vertex_array,
                imagery: &draws,
                water_mask: tile.water_mask().filter(|_| self.options.show_water_effect),
                partially_clipped: tile.is_clipped(),
                clipped_by_boundaries: tile.clipped_by_boundaries,
            };
            let passes = planner.plan_tile(&input, &layer_snapshot);
            stats.draw_passes += passes.len();
            stats.texture_bindings += passes.iter().map(|pass| pass.textures.len()).sum::<usize>();
            self.draw_passes.extend(passes);
        }
    }

    /// Recompute the active credits when the terrain or the set of
    /// contributing layers changes.
    fn update_credits(&mut self) {
        let mut layers: Vec<LayerId> = self
            .draw_passes
            .iter()
            .flat_map(|pass| pass.textures.iter().map(|binding| binding.layer))
            .collect();
        layers.sort_unstable_by_key(|layer| layer.0);
        layers.dedup();
        let contributing = (!self.rendered.is_empty(), layers);
        if self.credited.as_ref() == Some(&contributing) {
            return;
        }

        let mut credits = CreditSet::new();
        if contributing.0 {
            credits.extend(self.terrain.credits());
        }
        for layer in contributing.1.iter().filter_map(|id| self.layers.get(*id)) {
            credits.extend(layer.provider().credits());
        }
        self.credits = credits;
        self.credited = Some(contributing);
    }

    fn create_level_zero_tiles(&mut self) {
        let scheme = self.terrain.tiling_scheme();
        for key in self.terrain.level_zero_tiles() {
            let mut tile = Tile::new(
                key,
                scheme.tile_xy_to_rectangle(key),
                None,
                self.terrain.approximate_height_range(key),
            );
            tile.update_bounds(
                &self.ellipsoid,
                self.options.vertical_exaggeration,
                self.options.vertical_exaggeration_relative_height,
            );
            let id = self.arena.insert(tile);
            self.arena.push_root(id);
        }
    }

    /// Drop every tile, its resources and everything queued for it.
    fn destroy_tiles(&mut self) {
        self.load_queues.clear();
        self.replacement_queue.clear();
        for tile in self.arena.clear() {
            release_tile(tile, &mut self.layers, &mut self.resources);
        }
        self.rendered.clear();
        self.draw_passes.clear();
        self.credited = None;
    }

    // Imagery layers.

    /// Add a layer on top of the stack. Tiles already loading or loaded get
    /// entries for it right away, unless the layer is hidden.
    pub fn add_imagery_layer(&mut self, layer: ImageryLayer) -> LayerId {
        let id = self.layers.add(layer);
        self.attach_layer_to_tiles(id);
        id
    }

    /// Add a layer at `index` in the stack, 0 being the bottom.
    pub fn insert_imagery_layer(&mut self, layer: ImageryLayer, index: usize) -> LayerId {
        let id = self.layers.insert(layer, index);
        self.attach_layer_to_tiles(id);
        id
    }

    fn attach_layer_to_tiles(&mut self, id: LayerId) {
        let order = self.layers.order();
        let Some(layer) = self.layers.get_mut(id) else {
            return;
        };
        layer.was_shown = layer.show;
        if !layer.show {
            return;
        }
        let terrain = self.terrain.as_ref();
        for (_, tile) in self.arena.iter_mut() {
            if matches!(tile.state, TileLoadState::Start | TileLoadState::Failed) {
                continue;
            }
            if insert_layer_entries(tile, id, layer, &order, terrain) && tile.state == TileLoadState::Done {
                tile.state = TileLoadState::Loading;
            }
        }
    }

    /// Give tiles entries for layers whose `show` flipped on since last frame.
    fn attach_newly_shown_layers(&mut self) {
        let mut newly_shown = Vec::new();
        for (id, layer) in self.layers.iter_mut() {
            if layer.show && !layer.was_shown {
                newly_shown.push(id);
            }
            layer.was_shown = layer.show;
        }
        for id in newly_shown {
            self.attach_layer_to_tiles(id);
        }
    }

    /// Remove a layer and every tile binding to it, releasing its imagery.
    pub fn remove_imagery_layer(&mut self, id: LayerId) -> Result<ImageryLayer, ConfigurationError> {
        let Some(mut layer) = self.layers.remove(id) else {
            return Err(rejected(ConfigurationError::UnknownImageryLayer(id)));
        };
        let mut removed = 0;
        for (_, tile) in self.arena.iter_mut() {
            removed += remove_layer_entries(tile, id, &mut layer.cache, &mut self.resources);
        }
        layer.cache.release_all(&mut self.resources);
        debug!(layer = ?id, entries = removed, "imagery layer removed");
        Ok(layer)
    }

    pub fn raise_imagery_layer(&mut self, id: LayerId) -> Result<bool, ConfigurationError> {
        self.reorder(id, |layers| layers.raise(id))
    }

    pub fn lower_imagery_layer(&mut self, id: LayerId) -> Result<bool, ConfigurationError> {
        self.reorder(id, |layers| layers.lower(id))
    }

    pub fn raise_imagery_layer_to_top(&mut self, id: LayerId) -> Result<bool, ConfigurationError> {
        self.reorder(id, |layers| layers.raise_to_top(id))
    }

    pub fn lower_imagery_layer_to_bottom(&mut self, id: LayerId) -> Result<bool, ConfigurationError> {
        self.reorder(id, |layers| layers.lower_to_bottom(id))
    }

    /// Move a layer to `index`, clamped to the stack.
    pub fn move_imagery_layer(&mut self, id: LayerId, index: usize) -> Result<bool, ConfigurationError> {
        self.reorder(id, |layers| layers.move_to(id, index))
    }

    /// Apply a stack move and re-sort every tile's entries to match.
    /// Returns whether the order changed.
    fn reorder(
        &mut self,
        id: LayerId,
        apply: impl FnOnce(&mut ImageryLayerCollection) -> bool,
    ) -> Result<bool, ConfigurationError> {
        if self.layers.index_of(id).is_none() {
            return Err(rejected(ConfigurationError::UnknownImageryLayer(id)));
        }
        if !apply(&mut self.layers) {
            return Ok(false);
        }
        let order = self.layers.order();
        for (_, tile) in self.arena.iter_mut() {
            sort_entries_by_layer_order(tile, &order);
        }
        Ok(true)
    }

    /// Fetch a layer's imagery again. Each tile bound to the layer keeps
    /// drawing its current imagery until the replacement has loaded.
    /// Returns the number of tiles a reload was started on; tiles with a
    /// reload already pending are skipped.
    pub fn reload_imagery_layer(&mut self, id: LayerId) -> Result<usize, ConfigurationError> {
        let Some(index) = self.layers.index_of(id) else {
            return Err(rejected(ConfigurationError::UnknownImageryLayer(id)));
        };
        let Some(layer) = self.layers.get_mut(id) else {
            return Err(rejected(ConfigurationError::UnknownImageryLayer(id)));
        };
        layer.cache.clear_lookup();

        let terrain = self.terrain.as_ref();
        let mut reloaded = 0;
        for (_, tile) in self.arena.iter_mut() {
            if begin_reload(tile, id, layer, index == 0, terrain) {
                reloaded += 1;
                if tile.state == TileLoadState::Done {
                    tile.state = TileLoadState::Loading;
                }
            }
        }
        debug!(layer = ?id, tiles = reloaded, "imagery layer reload started");
        Ok(reloaded)
    }

    pub fn imagery_layers(&self) -> &ImageryLayerCollection {
        &self.layers
    }

    /// Mutable access to a layer's appearance. Changes apply from the next
    /// frame. Only showing a hidden layer touches tile bindings.
    pub fn imagery_layer_mut(&mut self, id: LayerId) -> Option<&mut ImageryLayer> {
        self.layers.get_mut(id)
    }

    // Terrain.

    /// Replace the terrain provider and rebuild the quadtree from new
    /// level-zero tiles. Results still in flight for the old provider are
    /// discarded when they arrive. Returns `false`, doing nothing, when
    /// `provider` is the instance already in use.
    pub fn set_terrain_provider(&mut self, provider: Arc<dyn TerrainProvider>) -> bool {
        if std::ptr::addr_eq(Arc::as_ptr(&self.terrain), Arc::as_ptr(&provider)) {
            return false;
        }
        let discarded = self.arena.len();
        self.destroy_tiles();
        self.ellipsoid = *provider.tiling_scheme().ellipsoid();
        self.terrain = provider;
        self.terrain_epoch += 1;
        self.create_level_zero_tiles();
        info!(
            epoch = self.terrain_epoch,
            discarded_tiles = discarded,
            roots = self.arena.roots().len(),
            "terrain provider replaced"
        );
        true
    }

    pub fn terrain_provider(&self) -> &Arc<dyn TerrainProvider> {
        &self.terrain
    }

    // Clipping.

    /// Attach a plane collection, replacing the current one, or detach with
    /// `None`. Fails without changing anything if the collection is attached
    /// to another surface.
    pub fn set_clipping_planes(&mut self, planes: Option<ClippingPlaneCollection>) -> Result<(), ConfigurationError> {
        if let (Some(new), Some(current)) = (&planes, &self.clipping_planes)
            && new.same_collection(&current.collection)
        {
            return Ok(());
        }
        if let Some(new) = &planes {
            new.attach(self.id).map_err(rejected)?;
        }
        if let Some(old) = self.clipping_planes.take() {
            old.collection.detach(self.id);
            if let Some(texture) = old.texture {
                self.resources.release_texture(texture);
            }
        }
        self.clipping_planes = planes.map(|collection| AttachedPlanes {
            collection,
            texture: None,
            version: None,
        });
        Ok(())
    }

    /// Attach a polygon collection, replacing the current one, or detach
    /// with `None`. The polygons must be defined on this surface's
    /// ellipsoid.
    pub fn set_clipping_polygons(
        &mut self,
        polygons: Option<ClippingPolygonCollection>,
    ) -> Result<(), ConfigurationError> {
        if let (Some(new), Some(current)) = (&polygons, &self.clipping_polygons)
            && new.same_collection(&current.collection)
        {
            return Ok(());
        }
        if let Some(new) = &polygons {
            new.attach(self.id, &self.ellipsoid).map_err(rejected)?;
        }
        if let Some(old) = self.clipping_polygons.take() {
            old.collection.detach(self.id);
            for texture in [old.positions_texture, old.extents_texture].into_iter().flatten() {
                self.resources.release_texture(texture);
            }
        }
        self.clipping_polygons = polygons.map(|collection| AttachedPolygons {
            collection,
            positions_texture: None,
            extents_texture: None,
            version: None,
        });
        Ok(())
    }

    pub fn clipping_planes(&self) -> Option<&ClippingPlaneCollection> {
        self.clipping_planes.as_ref().map(|attached| &attached.collection)
    }

    pub fn clipping_polygons(&self) -> Option<&ClippingPolygonCollection> {
        self.clipping_polygons.as_ref().map(|attached| &attached.collection)
    }

    // Settings.

    /// The color drawn where no imagery covers a tile. Unsetting it is an
    /// error.
    pub fn set_base_color(&mut self, color: Option<Color>) -> Result<(), ConfigurationError> {
        let color = color.ok_or(ConfigurationError::UndefinedBaseColor).map_err(rejected)?;
        self.options.base_color = Some(color);
        Ok(())
    }

    /// Change vertical exaggeration. Every tile's bounds are recomputed.
    pub fn set_vertical_exaggeration(
        &mut self,
        exaggeration: f64,
        relative_height: f64,
    ) -> Result<(), ConfigurationError> {
        validate_exaggeration(exaggeration, relative_height).map_err(rejected)?;
        self.options.vertical_exaggeration = exaggeration;
        self.options.vertical_exaggeration_relative_height = relative_height;
        for (_, tile) in self.arena.iter_mut() {
            tile.update_bounds(&self.ellipsoid, exaggeration, relative_height);
        }
        Ok(())
    }

    pub fn set_cartographic_limit_rectangle(&mut self, rectangle: Rectangle) -> Result<(), ConfigurationError> {
        validate_limit_rectangle(&rectangle).map_err(rejected)?;
        self.options.cartographic_limit_rectangle = rectangle;
        Ok(())
    }

    pub fn set_show_water_effect(&mut self, show: bool) {
        self.options.show_water_effect = show;
    }

    pub fn set_maximum_screen_space_error(&mut self, error: f64) -> Result<(), ConfigurationError> {
        if !(error.is_finite() && error > 0.0) {
            return Err(rejected(ConfigurationError::InvalidOption(format!(
                "maximum_screen_space_error must be positive, got {error}"
            ))));
        }
        self.options.maximum_screen_space_error = error;
        Ok(())
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    // Inspection.

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.arena.get(id)
    }

    pub fn find_tile(&self, key: strata_geo::TileKey) -> Option<TileId> {
        self.arena.find(key)
    }

    pub fn level_zero_tiles(&self) -> &[TileId] {
        self.arena.roots()
    }

    /// Every tile currently in the quadtree, loaded or not.
    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.arena.iter()
    }

    pub fn tile_count(&self) -> usize {
        self.arena.len()
    }

    /// Tiles selected by the last update, in traversal order.
    pub fn rendered_tiles(&self) -> &[TileId] {
        &self.rendered
    }

    pub fn draw_passes(&self) -> &[DrawPass] {
        &self.draw_passes
    }

    pub fn statistics(&self) -> &SurfaceStatistics {
        &self.statistics
    }

    /// Credits for the terrain and imagery drawn by the last update.
    pub fn credits(&self) -> &CreditSet {
        &self.credits
    }

    /// The most recently touched tile in the cache.
    pub fn replacement_queue_head(&self) -> Option<TileId> {
        self.replacement_queue.head()
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut R {
        &mut self.resources
    }

    /// Release every backend resource and detach clipping collections. The
    /// surface has no tiles afterwards and draws nothing.
    pub fn release_resources(&mut self) {
        self.destroy_tiles();
        for (_, layer) in self.layers.iter_mut() {
            layer.cache.release_all(&mut self.resources);
        }
        if let Some(old) = self.clipping_planes.take() {
            old.collection.detach(self.id);
            if let Some(texture) = old.texture {
                self.resources.release_texture(texture);
            }
        }
        if let Some(old) = self.clipping_polygons.take() {
            old.collection.detach(self.id);
            for texture in [old.positions_texture, old.extents_texture].into_iter().flatten() {
                self.resources.release_texture(texture);
            }
        }
    }
}

impl<R: RenderResources> Drop for GlobeSurface<R> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

impl<R: RenderResources> std::fmt::Debug for GlobeSurface<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobeSurface")
            .field("id", &self.id)
            .field("terrain_epoch", &self.terrain_epoch)
            .field("layers", &self.layers.len())
            .field("tiles", &self.arena.len())
            .field("rendered", &self.rendered.len())
            .finish()
    }
}
