//! Per-frame counters.

/// What the last [`update`](crate::GlobeSurface::update) did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceStatistics {
    pub tiles_visited: usize,
    pub tiles_rendered: usize,
    pub tiles_culled: usize,
    pub tiles_culled_by_clipping: usize,
    /// Tiles rendered in place of children that were not ready.
    pub tiles_waiting_for_children: usize,
    /// Fallback tiles whose children were promoted for taking too long.
    pub stale_fallbacks: usize,
    pub max_depth_rendered: u32,
    pub max_depth_visited: u32,
    pub tiles_processed: usize,
    pub terrain_requests: usize,
    pub imagery_requests: usize,
    pub throttled_requests: usize,
    pub load_failures: usize,
    pub stale_completions_discarded: usize,
    pub tiles_evicted: usize,
    pub tiles_in_cache: usize,
    pub draw_passes: usize,
    pub texture_bindings: usize,
    pub load_queue_high: usize,
    pub load_queue_medium: usize,
    pub load_queue_low: usize,
}

impl SurfaceStatistics {
    /// Whether the figures worth logging changed since `previous`.
    pub(crate) fn differs_in_shape(&self, previous: &Self) -> bool {
        self.tiles_rendered != previous.tiles_rendered
            || self.tiles_culled != previous.tiles_culled
            || self.tiles_waiting_for_children != previous.tiles_waiting_for_children
            || self.max_depth_rendered != previous.max_depth_rendered
            || self.tiles_in_cache != previous.tiles_in_cache
    }
}
