//! Declarative clipping regions and the per-tile clip decision.
//!
//! Collections are shared handles: the application keeps editing them
//! after attaching, and the surface snapshots them once per frame.

mod decision;
mod planes;
mod polygons;

pub use decision::{ClipDecision, ClipDecisionEngine};
pub use planes::{ClippingPlaneCollection, PlaneSnapshot};
pub use polygons::{ClippingPolygon, ClippingPolygonCollection, PolygonSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ConfigurationError;

/// Identity of one surface instance, used to enforce single ownership of
/// clipping collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Claim a collection for `surface`. Re-attaching to the same surface is
/// allowed.
pub(crate) fn claim(owner: &mut Option<SurfaceId>, surface: SurfaceId) -> Result<(), ConfigurationError> {
    match owner {
        Some(current) if *current != surface => Err(ConfigurationError::ClippingCollectionAlreadyAttached),
        _ => {
            *owner = Some(surface);
            Ok(())
        }
    }
}

pub(crate) fn release(owner: &mut Option<SurfaceId>, surface: SurfaceId) {
    if *owner == Some(surface) {
        *owner = None;
    }
}
