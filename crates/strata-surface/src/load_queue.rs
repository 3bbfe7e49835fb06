//! Per-frame queues of tiles waiting on terrain or imagery.
//!
//! Three tiers are drained strictly in order: tiles the traversal is
//! blocked on, tiles being drawn with incomplete data, and ancestors
//! preloaded for later zoom-outs. Within a tier, tiles with the highest
//! visual importance load first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::tile::TileId;

/// Which queue a tile load is placed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoadPriority {
    /// Ancestors loaded ahead of time.
    Low,
    /// Tiles rendered this frame that still have pending data.
    Medium,
    /// Tiles blocking refinement or with nothing to draw at all.
    High,
}

/// Factors that determine a tile's load priority within a tier.
#[derive(Clone, Debug)]
pub struct TileLoadFactors {
    /// Distance from the camera to the tile's bounding sphere.
    pub distance: f64,
    /// Quadtree level of the tile.
    pub level: u32,
    /// Whether the tile is inside the view frustum.
    pub in_frustum: bool,
    /// Dot product between the camera direction and the direction to the
    /// tile, from -1 (behind) to 1 (straight ahead).
    pub direction_dot: f64,
}

/// Score a tile load. Higher scores are loaded first.
#[must_use]
pub fn compute_load_priority(factors: &TileLoadFactors) -> f64 {
    let mut score = 0.0;

    // Closer tiles matter quadratically more. Distances are in meters, so
    // scale to kilometers before squaring.
    let distance_km = (factors.distance / 1000.0).max(1.0);
    score += 10_000.0 / (distance_km * distance_km);

    // Coarser tiles fill larger holes.
    score += 100.0 / f64::from(1_u32 << factors.level.min(31));

    if factors.in_frustum {
        score *= 10.0;
    }

    score += factors.direction_dot * 50.0;

    score
}

#[derive(Clone, Debug)]
struct QueueEntry {
    tile: TileId,
    score: f64,
    /// Insertion order, breaking score ties first-come first-served.
    sequence: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// The high, medium and low load queues for one surface.
///
/// A tile lives in at most one tier at a time. Pushing it again into a
/// higher tier moves it; pushing it into the same tier updates its score.
#[derive(Debug, Default)]
pub(crate) struct LoadQueues {
    high: BinaryHeap<QueueEntry>,
    medium: BinaryHeap<QueueEntry>,
    low: BinaryHeap<QueueEntry>,
    /// Current tier and sequence of each queued tile. Heap entries whose
    /// sequence differs are stale and skipped on pop.
    current: FxHashMap<TileId, (LoadPriority, u64)>,
    next_sequence: u64,
}

impl LoadQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tile: TileId, priority: LoadPriority, score: f64) {
        if let Some((existing, _)) = self.current.get(&tile)
            && *existing > priority
        {
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.current.insert(tile, (priority, sequence));
        let entry = QueueEntry { tile, score, sequence };
        match priority {
            LoadPriority::High => self.high.push(entry),
            LoadPriority::Medium => self.medium.push(entry),
            LoadPriority::Low => self.low.push(entry),
        }
    }

    /// Remove and return the most important tile, highest tier first.
    pub fn pop(&mut self) -> Option<(TileId, LoadPriority)> {
        for priority in [LoadPriority::High, LoadPriority::Medium, LoadPriority::Low] {
            let heap = match priority {
                LoadPriority::High => &mut self.high,
                LoadPriority::Medium => &mut self.medium,
                LoadPriority::Low => &mut self.low,
            };
            while let Some(entry) = heap.pop() {
                if self.current.get(&entry.tile) == Some(&(priority, entry.sequence)) {
                    self.current.remove(&entry.tile);
                    return Some((entry.tile, priority));
                }
            }
        }
        None
    }

    pub fn remove(&mut self, tile: TileId) {
        self.current.remove(&tile);
    }

    #[cfg(test)]
    pub fn priority_of(&self, tile: TileId) -> Option<LoadPriority> {
        self.current.get(&tile).map(|(priority, _)| *priority)
    }

    /// Number of live entries per tier: `(high, medium, low)`.
    pub fn lengths(&self) -> (usize, usize, usize) {
        self.current.values().fold((0, 0, 0), |(h, m, l), (priority, _)| match priority {
            LoadPriority::High => (h + 1, m, l),
            LoadPriority::Medium => (h, m + 1, l),
            LoadPriority::Low => (h, m, l + 1),
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn clear(&mut self) {
        self.high.clear();
        self.medium.clear();
        self.low.clear();
        self.current.clear();
    }
}
