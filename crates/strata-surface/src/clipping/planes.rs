//! Collections of clipping half-spaces.

use std::sync::{Arc, Mutex};

use glam::{DMat4, DVec4};
use strata_geo::{BoundingSphere, Intersect, Plane};

use super::{SurfaceId, claim, lock, release};
use crate::error::ConfigurationError;

#[derive(Debug)]
struct PlaneSet {
    planes: Vec<Plane>,
    union_clipping_regions: bool,
    enabled: bool,
    model_matrix: DMat4,
    edge_width: f64,
    edge_color: [f32; 4],
    owner: Option<SurfaceId>,
    version: u64,
}

/// Planes whose negative side is clipped away.
///
/// With `union_clipping_regions` unset (the default) geometry is removed
/// only where it lies outside every plane; with it set, geometry outside
/// any plane is removed.
#[derive(Clone, Debug)]
pub struct ClippingPlaneCollection {
    inner: Arc<Mutex<PlaneSet>>,
}

impl ClippingPlaneCollection {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaneSet {
                planes,
                union_clipping_regions: false,
                enabled: true,
                model_matrix: DMat4::IDENTITY,
                edge_width: 0.0,
                edge_color: [1.0, 1.0, 1.0, 1.0],
                owner: None,
                version: 0,
            })),
        }
    }

    fn edit(&self, change: impl FnOnce(&mut PlaneSet)) {
        let mut set = lock(&self.inner);
        change(&mut set);
        set.version += 1;
    }

    pub fn add(&self, plane: Plane) {
        self.edit(|set| set.planes.push(plane));
    }

    pub fn remove(&self, index: usize) -> Option<Plane> {
        let mut removed = None;
        self.edit(|set| {
            if index < set.planes.len() {
                removed = Some(set.planes.remove(index));
            }
        });
        removed
    }

    pub fn clear(&self) {
        self.edit(|set| set.planes.clear());
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_union_clipping_regions(&self, union: bool) {
        self.edit(|set| set.union_clipping_regions = union);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.edit(|set| set.enabled = enabled);
    }

    pub fn set_model_matrix(&self, model_matrix: DMat4) {
        self.edit(|set| set.model_matrix = model_matrix);
    }

    /// Width in pixels of the highlighted edge along clipped boundaries.
    pub fn set_edge_style(&self, width: f64, color: [f32; 4]) {
        self.edit(|set| {
            set.edge_width = width.max(0.0);
            set.edge_color = color;
        });
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.inner).enabled
    }

    /// Whether this collection is attached to any surface.
    pub fn is_attached(&self) -> bool {
        lock(&self.inner).owner.is_some()
    }

    /// Whether two handles refer to the same collection.
    pub fn same_collection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach(&self, surface: SurfaceId) -> Result<(), ConfigurationError> {
        claim(&mut lock(&self.inner).owner, surface)
    }

    pub(crate) fn detach(&self, surface: SurfaceId) {
        release(&mut lock(&self.inner).owner, surface);
    }

    /// Planes in world space, frozen for one frame.
    pub fn snapshot(&self) -> PlaneSnapshot {
        let set = lock(&self.inner);
        PlaneSnapshot {
            planes: set.planes.iter().map(|plane| plane.transform(&set.model_matrix)).collect(),
            union_clipping_regions: set.union_clipping_regions,
            enabled: set.enabled,
            edge_width: set.edge_width,
            edge_color: set.edge_color,
            version: set.version,
        }
    }
}

/// An immutable copy of a plane collection.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneSnapshot {
    pub planes: Vec<Plane>,
    pub union_clipping_regions: bool,
    pub enabled: bool,
    pub edge_width: f64,
    pub edge_color: [f32; 4],
    pub(crate) version: u64,
}

impl PlaneSnapshot {
    /// Whether the snapshot clips anything at all.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.planes.is_empty()
    }

    /// Classify a bounding sphere against the combined region. `Outside`
    /// means fully clipped away, `Inside` means untouched.
    pub fn intersect(&self, sphere: &BoundingSphere) -> Intersect {
        let mut result = if self.union_clipping_regions {
            Intersect::Inside
        } else {
            Intersect::Outside
        };
        for plane in &self.planes {
            match sphere.intersect_plane(plane) {
                Intersect::Intersecting => result = Intersect::Intersecting,
                Intersect::Outside if self.union_clipping_regions => return Intersect::Outside,
                Intersect::Inside if !self.union_clipping_regions => return Intersect::Inside,
                _ => {}
            }
        }
        result
    }

    /// Plane equations packed as `(nx, ny, nz, d)`, one texel each.
    pub fn packed(&self) -> Vec<f32> {
        self.planes
            .iter()
            .flat_map(|plane| {
                let v: DVec4 = plane.to_vec4();
                [v.x as f32, v.y as f32, v.z as f32, v.w as f32]
            })
            .collect()
    }
}
