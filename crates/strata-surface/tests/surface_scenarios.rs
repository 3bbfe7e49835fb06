//! End-to-end frames through the public surface API, on headless resources.

use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use strata_geo::{Cartographic, PerspectiveFrustum, Plane, TileKey, TilingScheme};
use strata_surface::provider::{
    EllipsoidTerrainProvider, ManualTerrainProvider, SingleTileImageryProvider, TerrainSource,
    ThreadedTerrainProvider, WorkerPool, estimated_level_zero_geometric_error,
};
use strata_surface::{
    BlendingState, CameraState, ClippingPlaneCollection, ClippingPolygon, ClippingPolygonCollection, Color,
    ConfigurationError, Credit,
    FrameState, GlobeSurface, HeadlessResources, ImageryLayer, LayerId, LoadFailure, LoadFailureKind,
    SurfaceOptions, TerrainData, TerrainProvider,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn options() -> SurfaceOptions {
    SurfaceOptions {
        load_queue_time_slice: Duration::from_secs(1),
        max_tile_loads_per_frame: 256,
        tile_cache_size: 10_000,
        ..SurfaceOptions::default()
    }
}

fn surface_with(terrain: Arc<dyn TerrainProvider>, resources: HeadlessResources) -> GlobeSurface {
    GlobeSurface::builder()
        .terrain_provider(terrain)
        .resources(resources)
        .options(options())
        .build()
        .expect("valid surface")
}

fn ellipsoid_surface() -> GlobeSurface {
    surface_with(Arc::new(EllipsoidTerrainProvider::default()), HeadlessResources::default())
}

fn solid_layer(color: [u8; 4], size: u32) -> ImageryLayer {
    ImageryLayer::new(Arc::new(SingleTileImageryProvider::solid(color, size, size)))
}

fn frame(number: u64, height: f64) -> FrameState {
    frame_at(number, -90.0, height)
}

fn frame_at(number: u64, longitude: f64, height: f64) -> FrameState {
    let camera = CameraState::looking_down(
        &strata_geo::Ellipsoid::WGS84,
        &Cartographic::from_degrees(longitude, 0.0, height),
        PerspectiveFrustum::default(),
    );
    FrameState::new(number, camera, 1080, 1080)
}

/// Run frames from a distant camera until loads have settled.
fn settle(surface: &mut GlobeSurface, first_frame: u64) -> u64 {
    let mut number = first_frame;
    for _ in 0..12 {
        surface.update(&frame(number, 1.0e8));
        number += 1;
    }
    number
}

fn pass_layers(surface: &GlobeSurface) -> Vec<Vec<LayerId>> {
    surface
        .draw_passes()
        .iter()
        .map(|pass| pass.textures.iter().map(|binding| binding.layer).collect())
        .collect()
}

#[test]
fn test_layers_draw_in_stack_order() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    settle(&mut surface, 1);

    assert!(!surface.rendered_tiles().is_empty());
    assert_eq!(surface.draw_passes().len(), surface.rendered_tiles().len());
    for pass in surface.draw_passes() {
        assert_eq!(pass.pass_index, 0);
        assert_eq!(pass.render_state.blending, BlendingState::Disabled);
        assert_eq!(pass.initial_color, Color::BLUE);
    }
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [red, green]));
}

#[test]
fn test_layer_added_after_load_reaches_loaded_tiles() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let next = settle(&mut surface, 1);
    assert!(!surface.rendered_tiles().is_empty());
    for id in surface.rendered_tiles() {
        let tile = surface.tile(*id).expect("rendered tile");
        assert!(tile.is_renderable());
        assert!(tile.imagery_count_for(red) >= 1);
    }

    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    settle(&mut surface, next);
    assert!(!surface.rendered_tiles().is_empty());
    for id in surface.rendered_tiles() {
        let tile = surface.tile(*id).expect("rendered tile");
        assert_eq!(tile.imagery_count_for(green), 1);
        let layers: Vec<LayerId> = tile.imagery().iter().map(|entry| entry.layer()).collect();
        assert_eq!(layers.last(), Some(&green));
        assert!(layers[..layers.len() - 1].iter().all(|layer| *layer == red));
        assert!(tile.imagery().iter().all(|entry| entry.is_ready()));
    }
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [red, green]));
}

#[test]
fn test_removing_layer_leaves_no_entries() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    let next = settle(&mut surface, 1);
    assert_eq!(surface.resources().live_texture_count(), 2);

    surface.remove_imagery_layer(red).expect("layer exists");
    assert!(surface.tiles().all(|(_, tile)| tile.imagery_count_for(red) == 0));
    assert!(surface.tiles().all(|(_, tile)| tile.reload_callback_count(red) == 0));
    assert_eq!(surface.resources().live_texture_count(), 1);

    surface.update(&frame(next, 1.0e8));
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [green]));
    assert_eq!(
        surface.remove_imagery_layer(red).err(),
        Some(ConfigurationError::UnknownImageryLayer(red))
    );
}

#[test]
fn test_reordering_layers_reorders_bindings() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    let next = settle(&mut surface, 1);

    assert_eq!(surface.raise_imagery_layer_to_top(red), Ok(true));
    assert_eq!(surface.raise_imagery_layer_to_top(red), Ok(false));
    assert_eq!(surface.imagery_layers().order(), [green, red]);
    for (_, tile) in surface.tiles() {
        let order: Vec<LayerId> = tile.imagery().iter().map(|entry| entry.layer()).collect();
        assert!(order.is_empty() || order == [green, red]);
    }

    surface.update(&frame(next, 1.0e8));
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [green, red]));

    assert_eq!(surface.move_imagery_layer(red, 0), Ok(true));
    assert_eq!(surface.lower_imagery_layer_to_bottom(red), Ok(false));
    surface.update(&frame(next + 1, 1.0e8));
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [red, green]));
}

#[test]
fn test_reload_keeps_drawing_until_replacement_is_ready() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let next = settle(&mut surface, 1);
    let loaded = surface
        .tiles()
        .filter(|(_, tile)| tile.imagery().iter().any(|entry| entry.layer() == red && entry.is_ready()))
        .count();
    assert!(loaded >= 2);

    assert_eq!(surface.reload_imagery_layer(red), Ok(loaded));
    assert!(
        surface
            .tiles()
            .filter(|(_, tile)| tile.reload_callback_count(red) == 1)
            .all(|(_, tile)| tile.imagery_count_for(red) == 2)
    );
    assert_eq!(surface.reload_imagery_layer(red), Ok(0));

    surface.update(&frame(next, 1.0e8));
    assert!(pass_layers(&surface).iter().all(|layers| layers.contains(&red)));

    settle(&mut surface, next + 1);
    assert!(surface.tiles().all(|(_, tile)| tile.reload_callback_count(red) == 0));
    assert!(surface.tiles().all(|(_, tile)| tile.imagery_count_for(red) <= 1));
    assert_eq!(surface.resources().live_texture_count(), 1);
    assert!(surface.resources().textures_created() >= 2);
}

#[test]
fn test_clipping_round_trip_restores_draw_passes() {
    let mut surface = ellipsoid_surface();
    surface.add_imagery_layer(solid_layer(RED, 16));
    let mut next = settle(&mut surface, 1);
    let before = surface.draw_passes().to_vec();
    let textures = surface.resources().live_texture_count();

    let polygon =
        ClippingPolygon::from_degrees(&[(100.0, 10.0), (110.0, 10.0), (110.0, 20.0), (100.0, 20.0)]).expect("polygon");
    let polygons = ClippingPolygonCollection::new(vec![polygon]);
    surface.set_clipping_polygons(Some(polygons.clone())).expect("attach");
    assert!(polygons.is_attached());

    surface.update(&frame(next, 1.0e8));
    next += 1;
    assert_eq!(surface.resources().live_texture_count(), textures + 2);
    assert!(
        surface
            .draw_passes()
            .iter()
            .all(|pass| pass.clipping.as_ref().is_some_and(|clip| clip.polygon_count == 1))
    );

    surface.set_clipping_polygons(None).expect("detach");
    assert!(!polygons.is_attached());
    assert_eq!(surface.resources().live_texture_count(), textures);

    surface.update(&frame(next, 1.0e8));
    assert_eq!(surface.draw_passes(), before.as_slice());
}

#[test]
fn test_clipping_planes_cull_or_partially_clip_tiles() {
    let mut surface = ellipsoid_surface();
    surface.add_imagery_layer(solid_layer(RED, 16));
    let below = ClippingPlaneCollection::new(vec![Plane::new(DVec3::Z, -1.0e8)]);
    surface.set_clipping_planes(Some(below.clone())).expect("attach");
    let next = settle(&mut surface, 1);

    assert!(surface.rendered_tiles().is_empty());
    assert!(surface.draw_passes().is_empty());
    assert_eq!(surface.statistics().tiles_culled_by_clipping, 2);

    let equator = ClippingPlaneCollection::new(vec![Plane::new(DVec3::Z, 0.0)]);
    surface.set_clipping_planes(Some(equator.clone())).expect("swap");
    assert!(!below.is_attached());
    assert!(equator.is_attached());
    settle(&mut surface, next);

    assert!(!surface.draw_passes().is_empty());
    assert_eq!(surface.statistics().tiles_culled_by_clipping, 0);
    for pass in surface.draw_passes() {
        let clipping = pass.clipping.as_ref().expect("clipping uniforms");
        assert_eq!(clipping.plane_count, 1);
        assert!(clipping.planes_texture.is_some());
        assert!(!pass.render_state.cull_face);
    }
}

#[test]
fn test_collection_attaches_to_one_surface() {
    let mut first = ellipsoid_surface();
    let mut second = ellipsoid_surface();
    let polygon =
        ClippingPolygon::from_degrees(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]).expect("polygon");
    let polygons = ClippingPolygonCollection::new(vec![polygon]);

    first.set_clipping_polygons(Some(polygons.clone())).expect("attach");
    first.set_clipping_polygons(Some(polygons.clone())).expect("same collection is a no-op");
    assert_eq!(
        second.set_clipping_polygons(Some(polygons.clone())),
        Err(ConfigurationError::ClippingCollectionAlreadyAttached)
    );
    assert!(second.clipping_polygons().is_none());
    assert!(first.clipping_polygons().is_some());

    first.set_clipping_polygons(None).expect("detach");
    second.set_clipping_polygons(Some(polygons)).expect("free to attach");
}

#[test]
fn test_terrain_swap_rebuilds_quadtree() {
    let mut surface = ellipsoid_surface();
    let next = settle(&mut surface, 1);
    let old_roots = surface.level_zero_tiles().to_vec();
    let head = surface.replacement_queue_head().expect("touched tiles");

    let replacement: Arc<dyn TerrainProvider> = Arc::new(ManualTerrainProvider::new());
    assert!(surface.set_terrain_provider(Arc::clone(&replacement)));
    assert_eq!(surface.level_zero_tiles().len(), 2);
    assert!(old_roots.iter().all(|id| surface.tile(*id).is_none()));
    assert!(surface.tile(head).is_none());
    assert!(surface.replacement_queue_head().is_none());
    assert_eq!(surface.resources().live_vertex_array_count(), 0);

    let roots = surface.level_zero_tiles().to_vec();
    assert!(!surface.set_terrain_provider(replacement));
    assert_eq!(surface.level_zero_tiles(), roots.as_slice());

    surface.update(&frame(next, 1.0e8));
    assert!(surface.rendered_tiles().is_empty());
}

#[test]
fn test_results_for_replaced_provider_are_discarded() {
    let old = Arc::new(ManualTerrainProvider::new());
    let mut surface = surface_with(old.clone(), HeadlessResources::default());
    surface.update(&frame(1, 1.0e8));
    assert_eq!(old.pending_count(), 2);

    surface.set_terrain_provider(Arc::new(ManualTerrainProvider::new()));
    assert_eq!(old.resolve_all(), 2);
    surface.update(&frame(2, 1.0e8));

    assert_eq!(surface.statistics().stale_completions_discarded, 2);
    assert!(surface.tiles().all(|(_, tile)| !tile.is_renderable()));
    assert_eq!(surface.resources().live_vertex_array_count(), 0);
}

#[test]
fn test_texture_units_split_layers_into_passes() {
    let mut surface = surface_with(Arc::new(EllipsoidTerrainProvider::default()), HeadlessResources::new(2));
    let layers: Vec<LayerId> = (0..5u8)
        .map(|shade| surface.add_imagery_layer(solid_layer([shade * 40, 0, 0, 255], 4)))
        .collect();
    settle(&mut surface, 1);

    let rendered = surface.rendered_tiles().len();
    assert!(rendered > 0);
    assert_eq!(surface.draw_passes().len(), rendered * 3);

    for tile in surface.rendered_tiles() {
        let passes: Vec<_> = surface.draw_passes().iter().filter(|pass| pass.tile == *tile).collect();
        assert_eq!(passes.len(), 3);
        assert_eq!(passes[0].render_state.blending, BlendingState::Disabled);
        assert_eq!(passes[0].initial_color, Color::BLUE);
        for pass in &passes[1..] {
            assert_eq!(pass.render_state.blending, BlendingState::AlphaBlend);
            assert_eq!(pass.initial_color, Color::TRANSPARENT);
        }
        let bound: Vec<LayerId> = passes
            .iter()
            .flat_map(|pass| pass.textures.iter().map(|binding| binding.layer))
            .collect();
        assert_eq!(bound, layers);
    }
}

#[test]
fn test_zooming_out_evicts_detail_tiles() {
    let options = SurfaceOptions {
        tile_cache_size: 4,
        ..options()
    };
    let mut surface = GlobeSurface::builder()
        .terrain_provider(Arc::new(EllipsoidTerrainProvider::default()))
        .resources(HeadlessResources::default())
        .options(options)
        .build()
        .expect("valid surface");
    surface.add_imagery_layer(solid_layer(RED, 16));
    let roots = {
        surface.update(&frame(1, 1.0e8));
        surface.level_zero_tiles().to_vec()
    };

    let mut number = 2;
    for _ in 0..16 {
        surface.update(&frame(number, 1.0e4));
        number += 1;
    }
    let zoomed_in = surface.tile_count();
    let zoomed_in_vertex_arrays = surface.resources().live_vertex_array_count();
    assert!(zoomed_in > 2);

    for step in 0..8 {
        surface.update(&frame_at(number, -90.0 + f64::from(step) * 0.5, 1.0e4));
        number += 1;
    }
    settle(&mut surface, number);

    assert!(surface.tile_count() < zoomed_in);
    assert!(surface.statistics().tiles_in_cache <= 4);
    assert!(surface.resources().live_vertex_array_count() < zoomed_in_vertex_arrays);
    assert!(surface.resources().live_vertex_array_count() <= surface.tile_count());
    assert!(surface.resources().live_texture_count() >= 1);
    assert_eq!(surface.level_zero_tiles(), roots.as_slice());
    assert!(roots.iter().all(|id| surface.tile(*id).is_some()));
    for (_, tile) in surface.tiles() {
        assert!(tile.children().into_iter().flatten().all(|child| surface.tile(child).is_some()));
    }
    assert!(surface.rendered_tiles().iter().all(|id| surface.tile(*id).is_some()));
}

#[test]
fn test_hidden_layer_gets_entries_once_shown() {
    let mut surface = ellipsoid_surface();
    let mut hidden = solid_layer(RED, 16);
    hidden.show = false;
    let red = surface.add_imagery_layer(hidden);
    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    let next = settle(&mut surface, 1);

    assert!(surface.tiles().all(|(_, tile)| tile.imagery_count_for(red) == 0));
    assert!(surface.tiles().any(|(_, tile)| tile.imagery_count_for(green) == 1));
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [green]));

    if let Some(layer) = surface.imagery_layer_mut(red) {
        layer.show = true;
    }
    settle(&mut surface, next);
    assert!(!surface.rendered_tiles().is_empty());
    for id in surface.rendered_tiles() {
        let tile = surface.tile(*id).expect("rendered tile");
        let layers: Vec<LayerId> = tile.imagery().iter().map(|entry| entry.layer()).collect();
        assert_eq!(layers, [red, green]);
    }
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [red, green]));
}

#[test]
fn test_hidden_layers_are_not_drawn() {
    let mut surface = ellipsoid_surface();
    let red = surface.add_imagery_layer(solid_layer(RED, 16));
    let green = surface.add_imagery_layer(solid_layer(GREEN, 4));
    let next = settle(&mut surface, 1);

    if let Some(layer) = surface.imagery_layer_mut(red) {
        layer.show = false;
    }
    surface.update(&frame(next, 1.0e8));
    assert!(pass_layers(&surface).iter().all(|layers| *layers == [green]));
    assert!(surface.tiles().any(|(_, tile)| tile.imagery_count_for(red) == 1));
}

#[test]
fn test_failed_child_leaves_parent_drawn() {
    let terrain = Arc::new(ManualTerrainProvider::new());
    let mut surface = surface_with(terrain.clone(), HeadlessResources::default());
    let failed = TileKey::new(1, 0, 0);

    for number in 1..=12 {
        surface.update(&frame(number, 1.0e6));
        for key in terrain.pending_keys() {
            if key == failed {
                terrain.fail(key, LoadFailure::new(LoadFailureKind::Network, "connection reset"));
            } else {
                terrain.resolve(key, Ok(TerrainData::flat(16, 16)));
            }
        }
    }

    let child = surface.find_tile(failed).expect("child created");
    let child = surface.tile(child).expect("child tile");
    assert!(child.has_failed());
    assert_eq!(child.terrain_failure().map(|failure| failure.kind), Some(LoadFailureKind::Network));

    let west = surface.find_tile(TileKey::new(0, 0, 0)).expect("west root");
    assert!(surface.rendered_tiles().contains(&west));
    assert!(
        surface
            .tile(west)
            .map(|tile| tile.children())
            .into_iter()
            .flatten()
            .flatten()
            .all(|child| !surface.rendered_tiles().contains(&child))
    );
}

#[test]
fn test_throttled_terrain_requests_are_retried() {
    let terrain = Arc::new(ManualTerrainProvider::new());
    terrain.set_throttled(true);
    let mut surface = surface_with(terrain.clone(), HeadlessResources::default());

    surface.update(&frame(1, 1.0e8));
    assert_eq!(surface.statistics().throttled_requests, 2);
    assert_eq!(terrain.pending_count(), 0);

    terrain.set_throttled(false);
    surface.update(&frame(2, 1.0e8));
    assert_eq!(surface.statistics().throttled_requests, 0);
    assert_eq!(terrain.pending_count(), 2);

    terrain.resolve_all();
    surface.update(&frame(3, 1.0e8));
    surface.update(&frame(4, 1.0e8));
    assert!(!surface.rendered_tiles().is_empty());
}

#[test]
fn test_credits_follow_what_is_drawn() {
    let terrain = EllipsoidTerrainProvider::default().with_credit(Credit::new("Terrain Co"));
    let mut surface = surface_with(Arc::new(terrain), HeadlessResources::default());
    let imagery = SingleTileImageryProvider::solid(RED, 4, 4).with_credit(Credit::new("Imagery Co"));
    let layer = surface.add_imagery_layer(ImageryLayer::new(Arc::new(imagery)));
    let next = settle(&mut surface, 1);

    assert!(surface.credits().contains_text("Terrain Co"));
    assert!(surface.credits().contains_text("Imagery Co"));

    surface.remove_imagery_layer(layer).expect("layer exists");
    surface.update(&frame(next, 1.0e8));
    assert!(surface.credits().contains_text("Terrain Co"));
    assert!(!surface.credits().contains_text("Imagery Co"));
}

#[test]
fn test_release_resources_frees_everything() {
    let mut surface = ellipsoid_surface();
    surface.add_imagery_layer(solid_layer(RED, 16));
    surface.add_imagery_layer(solid_layer(GREEN, 4));
    let polygon =
        ClippingPolygon::from_degrees(&[(100.0, 10.0), (110.0, 10.0), (110.0, 20.0)]).expect("polygon");
    let polygons = ClippingPolygonCollection::new(vec![polygon]);
    surface.set_clipping_polygons(Some(polygons.clone())).expect("attach");
    settle(&mut surface, 1);
    assert!(surface.resources().live_texture_count() > 0);
    assert!(surface.resources().live_vertex_array_count() > 0);

    surface.release_resources();
    assert_eq!(surface.resources().live_texture_count(), 0);
    assert_eq!(surface.resources().live_vertex_array_count(), 0);
    assert_eq!(surface.tile_count(), 0);
    assert!(!polygons.is_attached());
}

struct FlatSource {
    tiling_scheme: TilingScheme,
    level_zero_error: f64,
}

impl FlatSource {
    fn new() -> Self {
        let tiling_scheme = TilingScheme::geographic(strata_geo::Ellipsoid::WGS84);
        let level_zero_error = estimated_level_zero_geometric_error(
            tiling_scheme.ellipsoid(),
            64,
            tiling_scheme.number_of_x_tiles_at_level(0),
        );
        Self {
            tiling_scheme,
            level_zero_error,
        }
    }
}

impl TerrainSource for FlatSource {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_error / f64::from(1u32 << level.min(31))
    }

    fn generate(&self, _key: TileKey) -> Result<TerrainData, LoadFailure> {
        Ok(TerrainData::flat(16, 16))
    }
}

#[test]
fn test_threaded_provider_delivers_terrain() {
    let pool = WorkerPool::new(Arc::new(FlatSource::new()), 2, 16).expect("spawn workers");
    let mut surface = surface_with(Arc::new(ThreadedTerrainProvider::new(pool)), HeadlessResources::default());

    let mut number = 1;
    while surface.rendered_tiles().is_empty() && number < 500 {
        surface.update(&frame(number, 1.0e8));
        number += 1;
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!surface.rendered_tiles().is_empty());
    assert!(surface.resources().live_vertex_array_count() >= 1);
}
