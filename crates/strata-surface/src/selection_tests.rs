//! Tests for quadtree tile selection.

use strata_geo::{Cartographic, PerspectiveFrustum, Plane, TileKey};

use super::*;
use crate::clipping::{ClippingPlaneCollection, PlaneSnapshot};
use crate::frame::CameraState;
use crate::provider::{EllipsoidTerrainProvider, ManualTerrainProvider};
use crate::resources::VertexArrayHandle;
use crate::tile::{TerrainRenderData, TerrainState, TileLoadState};

const ELLIPSOID: Ellipsoid = Ellipsoid::WGS84;

struct Fixture {
    arena: TileArena,
    replacement_queue: TileReplacementQueue,
    load_queues: LoadQueues,
    terrain: Box<dyn TerrainProvider>,
    options: SurfaceOptions,
    stats: SurfaceStatistics,
    planes: Option<PlaneSnapshot>,
    fog: FogState,
}

impl Fixture {
    fn new(terrain: Box<dyn TerrainProvider>) -> Self {
        let mut arena = TileArena::new();
        let scheme = terrain.tiling_scheme();
        for key in terrain.level_zero_tiles() {
            let mut tile = Tile::new(key, scheme.tile_xy_to_rectangle(key), None, (0.0, 0.0));
            tile.update_bounds(&ELLIPSOID, 1.0, 0.0);
            let id = arena.insert(tile);
            arena.push_root(id);
        }
        Self {
            arena,
            replacement_queue: TileReplacementQueue::new(),
            load_queues: LoadQueues::new(),
            terrain,
            options: SurfaceOptions::default(),
            stats: SurfaceStatistics::default(),
            planes: None,
            fog: FogState::DISABLED,
        }
    }

    fn ellipsoid() -> Self {
        Self::new(Box::new(EllipsoidTerrainProvider::default()))
    }

    fn select(&mut self, frame: &FrameState) -> Vec<TileId> {
        let clip = ClipDecisionEngine::new(self.planes.clone(), None);
        let culler = TileCuller::new(
            frame,
            &ELLIPSOID,
            self.fog,
            self.options.cartographic_limit_rectangle,
            &clip,
        );
        let settings = SelectionSettings {
            options: &self.options,
            ellipsoid: ELLIPSOID,
            frame_number: frame.frame_number,
            viewport_height: frame.viewport_height,
            sse_denominator: frame.camera.frustum.sse_denominator(),
        };
        self.stats = SurfaceStatistics::default();
        self.load_queues.clear();
        self.replacement_queue.mark_start_of_render_frame();
        LodSelector::new(
            &mut self.arena,
            &mut self.replacement_queue,
            &mut self.load_queues,
            self.terrain.as_ref(),
            &culler,
            settings,
            &mut self.stats,
        )
        .select()
    }

    fn make_all_ready(&mut self) {
        for (_, tile) in self.arena.iter_mut() {
            make_ready(tile);
        }
    }

    fn clip_with_plane(&mut self, distance: f64) {
        let planes = ClippingPlaneCollection::new(vec![Plane::new(DVec3::Z, distance)]);
        self.planes = Some(planes.snapshot());
    }

    fn root_for(&self, key: TileKey) -> TileId {
        self.arena.find(key).expect("root exists")
    }
}

fn make_ready(tile: &mut Tile) {
    tile.terrain = TerrainState::Ready(TerrainRenderData {
        vertex_array: VertexArrayHandle(1),
        water_mask: None,
        child_tile_mask: 0b1111,
    });
    tile.state = TileLoadState::Done;
}

fn frame(number: u64, height: f64) -> FrameState {
    let camera = CameraState::looking_down(
        &ELLIPSOID,
        &Cartographic::from_degrees(-90.0, 0.0, height),
        PerspectiveFrustum::default(),
    );
    FrameState::new(number, camera, 1080, 1080)
}

const WEST_ROOT: TileKey = TileKey::new(0, 0, 0);
const EAST_ROOT: TileKey = TileKey::new(0, 1, 0);

#[test]
fn test_unloaded_roots_are_queued_not_rendered() {
    let mut fixture = Fixture::ellipsoid();
    let rendered = fixture.select(&frame(1, 1.0e8));
    assert!(rendered.is_empty());
    let west = fixture.root_for(WEST_ROOT);
    let east = fixture.root_for(EAST_ROOT);
    assert_eq!(fixture.load_queues.priority_of(west), Some(LoadPriority::High));
    assert_eq!(fixture.load_queues.priority_of(east), Some(LoadPriority::High));
    assert_eq!(fixture.replacement_queue.len(), 2);
}

#[test]
fn test_distant_camera_renders_roots() {
    let mut fixture = Fixture::ellipsoid();
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e8));

    let west = fixture.root_for(WEST_ROOT);
    assert!(rendered.contains(&west));
    assert!(rendered.iter().all(|id| fixture.arena.get(*id).is_some_and(|tile| tile.key.level == 0)));
    assert_eq!(fixture.arena.len(), 2);
    assert_eq!(
        fixture.arena.get(west).map(Tile::last_selection),
        Some(TileSelectionResult::Rendered)
    );
}

#[test]
fn test_parent_stands_in_for_loading_children() {
    let mut fixture = Fixture::ellipsoid();
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e6));

    let west = fixture.root_for(WEST_ROOT);
    assert!(rendered.contains(&west));
    assert!(fixture.stats.tiles_waiting_for_children >= 1);

    let children = fixture.arena.get(west).map(Tile::children).expect("west root");
    assert!(children.iter().all(Option::is_some));
    let queued: Vec<_> = children
        .iter()
        .flatten()
        .filter_map(|child| fixture.load_queues.priority_of(*child))
        .collect();
    assert!(!queued.is_empty());
    assert!(queued.iter().all(|priority| *priority == LoadPriority::Medium));
}

#[test]
fn test_long_fallback_promotes_children() {
    let mut fixture = Fixture::ellipsoid();
    fixture.options.max_fallback_frames = 2;
    fixture.make_all_ready();

    for number in 1..=3 {
        fixture.select(&frame(number, 1.0e6));
        assert_eq!(fixture.stats.stale_fallbacks, 0);
    }
    fixture.select(&frame(4, 1.0e6));
    assert!(fixture.stats.stale_fallbacks >= 1);

    let west = fixture.root_for(WEST_ROOT);
    let children = fixture.arena.get(west).map(Tile::children).expect("west root");
    assert!(
        children
            .iter()
            .flatten()
            .any(|child| fixture.load_queues.priority_of(*child) == Some(LoadPriority::High))
    );
}

#[test]
fn test_ready_children_replace_parent() {
    let mut fixture = Fixture::ellipsoid();
    fixture.make_all_ready();
    fixture.select(&frame(1, 1.0e6));
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(2, 1.0e6));

    let west = fixture.root_for(WEST_ROOT);
    assert!(!rendered.contains(&west));
    assert_eq!(
        fixture.arena.get(west).map(Tile::last_selection),
        Some(TileSelectionResult::Refined)
    );
    assert!(rendered.iter().all(|id| fixture.arena.get(*id).is_some_and(|tile| tile.key.level >= 1)));
}

#[test]
fn test_selection_is_deterministic() {
    let mut a = Fixture::ellipsoid();
    let mut b = Fixture::ellipsoid();
    for fixture in [&mut a, &mut b] {
        fixture.make_all_ready();
        fixture.select(&frame(1, 1.0e6));
        fixture.make_all_ready();
    }
    let keys = |fixture: &mut Fixture| -> Vec<TileKey> {
        let rendered = fixture.select(&frame(2, 1.0e6));
        rendered
            .iter()
            .filter_map(|id| fixture.arena.get(*id).map(|tile| tile.key))
            .collect()
    };
    assert_eq!(keys(&mut a), keys(&mut b));
}

#[test]
fn test_maximum_level_stops_refinement() {
    let mut fixture = Fixture::new(Box::new(ManualTerrainProvider::new().with_maximum_level(0)));
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e6));

    assert!(rendered.contains(&fixture.root_for(WEST_ROOT)));
    assert_eq!(fixture.arena.len(), 2);
    assert_eq!(fixture.stats.tiles_waiting_for_children, 0);
}

#[test]
fn test_unavailable_child_stops_refinement() {
    let mut fixture = Fixture::ellipsoid();
    fixture.make_all_ready();
    let west = fixture.root_for(WEST_ROOT);
    if let Some(TerrainState::Ready(render)) = fixture.arena.get_mut(west).map(|tile| &mut tile.terrain) {
        render.child_tile_mask = 0b1101;
    }
    let rendered = fixture.select(&frame(1, 1.0e6));

    assert!(rendered.contains(&west));
    assert!(fixture.arena.get(west).is_some_and(|tile| tile.children().iter().all(Option::is_none)));
}

#[test]
fn test_failed_child_keeps_parent_as_leaf() {
    let mut fixture = Fixture::ellipsoid();
    fixture.make_all_ready();
    fixture.select(&frame(1, 1.0e6));

    let west = fixture.root_for(WEST_ROOT);
    let children = fixture.arena.get(west).map(Tile::children).expect("west root");
    let failed = children[1].expect("child created");
    if let Some(tile) = fixture.arena.get_mut(failed) {
        tile.state = TileLoadState::Failed;
    }

    let rendered = fixture.select(&frame(2, 1.0e6));
    assert!(rendered.contains(&west));
    assert_eq!(
        fixture.arena.get(west).map(Tile::last_selection),
        Some(TileSelectionResult::Rendered)
    );
    assert_eq!(fixture.arena.get(west).and_then(|tile| tile.fallback_since), None);
}

#[test]
fn test_limit_rectangle_culls_and_flags() {
    let mut fixture = Fixture::ellipsoid();
    fixture.options.cartographic_limit_rectangle = Rectangle::from_degrees(-100.0, -10.0, -80.0, 10.0);
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e8));

    let west = fixture.root_for(WEST_ROOT);
    let east = fixture.root_for(EAST_ROOT);
    assert_eq!(rendered, [west]);
    assert!(fixture.arena.get(west).is_some_and(|tile| tile.clipped_by_boundaries));
    assert_eq!(
        fixture.arena.get(east).map(Tile::last_selection),
        Some(TileSelectionResult::Culled)
    );
}

#[test]
fn test_far_side_tile_is_culled() {
    let frame = frame(1, 1.0e7);
    let clip = ClipDecisionEngine::new(None, None);
    let culler = TileCuller::new(&frame, &ELLIPSOID, FogState::DISABLED, Rectangle::MAX_VALUE, &clip);
    let scheme = EllipsoidTerrainProvider::default().tiling_scheme().clone();

    let key = TileKey::new(3, 12, 4);
    let mut far = Tile::new(key, scheme.tile_xy_to_rectangle(key), None, (0.0, 0.0));
    far.update_bounds(&ELLIPSOID, 1.0, 0.0);
    assert_eq!(culler.evaluate(&mut far), Visibility::Culled);

    let key = TileKey::new(3, 4, 3);
    let mut near = Tile::new(key, scheme.tile_xy_to_rectangle(key), None, (0.0, 0.0));
    near.update_bounds(&ELLIPSOID, 1.0, 0.0);
    assert_eq!(culler.evaluate(&mut near), Visibility::Visible);
    assert!((near.distance - 1.0e7).abs() < 1.0e3);
}

#[test]
fn test_tiles_outside_clipping_plane_are_skipped() {
    let mut fixture = Fixture::ellipsoid();
    fixture.clip_with_plane(-1.0e8);
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e8));

    assert!(rendered.is_empty());
    assert!(fixture.load_queues.is_empty());
    assert_eq!(fixture.stats.tiles_culled_by_clipping, 2);
    assert_eq!(fixture.stats.tiles_culled, 0);
    let west = fixture.root_for(WEST_ROOT);
    assert_eq!(
        fixture.arena.get(west).map(Tile::last_selection),
        Some(TileSelectionResult::Culled)
    );
    assert_eq!(fixture.arena.get(west).map(|tile| tile.clip), Some(ClipDecision::FullyCulled));
}

#[test]
fn test_tile_straddling_clipping_plane_is_partially_clipped() {
    let mut fixture = Fixture::ellipsoid();
    fixture.clip_with_plane(0.0);
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e8));

    let west = fixture.root_for(WEST_ROOT);
    assert!(rendered.contains(&west));
    assert_eq!(fixture.stats.tiles_culled_by_clipping, 0);
    assert_eq!(fixture.arena.get(west).map(|tile| tile.clip), Some(ClipDecision::PartiallyClipped));
}

#[test]
fn test_dense_fog_culls_distant_tiles() {
    let mut fixture = Fixture::ellipsoid();
    fixture.fog = FogState {
        enabled: true,
        density: 1.0e-3,
        screen_space_error_factor: 2.0,
    };
    fixture.make_all_ready();
    let rendered = fixture.select(&frame(1, 1.0e8));

    assert!(rendered.is_empty());
    assert!(fixture.load_queues.is_empty());
    assert_eq!(fixture.stats.tiles_culled, 2);
    assert_eq!(fixture.stats.tiles_culled_by_clipping, 0);
}
