//! Least-recently-rendered ordering of cached tiles.
//!
//! The queue is intrusive: links live on the tiles themselves, so touching
//! and unlinking are constant time. Tiles touched during the current frame
//! sit in front of the marker recorded by
//! [`TileReplacementQueue::mark_start_of_render_frame`] and are never
//! trimmed.

use crate::tile::TileId;
use crate::tile_arena::TileArena;

#[derive(Debug, Default)]
pub(crate) struct TileReplacementQueue {
    head: Option<TileId>,
    tail: Option<TileId>,
    count: usize,
    last_before_start_of_frame: Option<TileId>,
}

impl TileReplacementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<TileId> {
        self.head
    }

    #[cfg(test)]
    pub fn tail(&self) -> Option<TileId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Remember the current head. Everything from it to the tail was not
    /// touched this frame.
    pub fn mark_start_of_render_frame(&mut self) {
        self.last_before_start_of_frame = self.head;
    }

    /// Move `id` to the head, inserting it if it is not queued yet.
    pub fn mark_tile_rendered(&mut self, arena: &mut TileArena, id: TileId) {
        let Some(head) = self.head else {
            if let Some(tile) = arena.get_mut(id) {
                tile.replacement_previous = None;
                tile.replacement_next = None;
                self.head = Some(id);
                self.tail = Some(id);
                self.count = 1;
            }
            return;
        };

        if head == id {
            if self.last_before_start_of_frame == Some(id) {
                self.last_before_start_of_frame = arena.get(id).and_then(|tile| tile.replacement_next);
            }
            return;
        }

        if !arena.contains(id) {
            return;
        }
        if self.is_queued(arena, id) {
            self.remove(arena, id);
        }

        if let Some(tile) = arena.get_mut(id) {
            tile.replacement_previous = None;
            tile.replacement_next = Some(head);
        }
        if let Some(head_tile) = arena.get_mut(head) {
            head_tile.replacement_previous = Some(id);
        }
        self.head = Some(id);
        self.count += 1;
    }

    fn is_queued(&self, arena: &TileArena, id: TileId) -> bool {
        if self.head == Some(id) {
            return true;
        }
        arena
            .get(id)
            .is_some_and(|tile| tile.replacement_previous.is_some() || tile.replacement_next.is_some())
    }

    /// Unlink `id`. A no-op if it is not queued.
    pub fn remove(&mut self, arena: &mut TileArena, id: TileId) {
        if !self.is_queued(arena, id) {
            return;
        }
        let Some(tile) = arena.get_mut(id) else {
            return;
        };
        let previous = tile.replacement_previous.take();
        let next = tile.replacement_next.take();

        if self.last_before_start_of_frame == Some(id) {
            self.last_before_start_of_frame = next;
        }

        if self.head == Some(id) {
            self.head = next;
        } else if let Some(previous_tile) = previous.and_then(|p| arena.get_mut(p)) {
            previous_tile.replacement_next = next;
        }

        if self.tail == Some(id) {
            self.tail = previous;
        } else if let Some(next_tile) = next.and_then(|n| arena.get_mut(n)) {
            next_tile.replacement_previous = previous;
        }

        self.count -= 1;
    }

    /// Evict untouched tiles from the tail until at most `maximum_tiles`
    /// remain or every tile not touched this frame has been considered.
    ///
    /// `evict` decides whether a candidate may go and, if so, removes it
    /// (and whatever it owns) from both the arena and this queue. Returns the
    /// number of candidates evicted.
    pub fn trim_tiles<F>(&mut self, arena: &mut TileArena, maximum_tiles: usize, mut evict: F) -> usize
    where
        F: FnMut(&mut Self, &mut TileArena, TileId) -> bool,
    {
        let mut evicted = 0;
        let mut candidate = self.tail;
        let mut keep_trimming = true;

        while keep_trimming && self.last_before_start_of_frame.is_some() && self.count > maximum_tiles {
            let Some(id) = candidate else {
                break;
            };
            keep_trimming = Some(id) != self.last_before_start_of_frame;
            let previous = arena.get(id).and_then(|tile| tile.replacement_previous);

            if evict(self, arena, id) {
                evicted += 1;
                // Evicting a subtree can unlink the tile we were about to
                // visit; start over from the tail in that case.
                candidate = match previous {
                    Some(p) if arena.contains(p) && self.is_queued(arena, p) => Some(p),
                    Some(_) => self.tail,
                    None => None,
                };
            } else {
                candidate = previous;
            }
        }
        evicted
    }

    /// Tiles from most to least recently rendered.
    #[cfg(test)]
    pub fn iter_ids(&self, arena: &TileArena) -> Vec<TileId> {
        let mut ids = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = arena.get(id).and_then(|tile| tile.replacement_next);
        }
        ids
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Tile;
    use strata_geo::{Rectangle, TileKey};

    fn arena_with(count: u32) -> (TileArena, Vec<TileId>) {
        let mut arena = TileArena::new();
        let ids = (0..count)
            .map(|x| arena.insert(Tile::new(TileKey::new(1, x, 0), Rectangle::MAX_VALUE, None, (0.0, 0.0))))
            .collect();
        (arena, ids)
    }

    #[test]
    fn test_rendered_tiles_move_to_head() {
        let (mut arena, ids) = arena_with(3);
        let mut queue = TileReplacementQueue::new();
        for id in &ids {
            queue.mark_tile_rendered(&mut arena, *id);
        }
        assert_eq!(queue.iter_ids(&arena), vec![ids[2], ids[1], ids[0]]);

        queue.mark_tile_rendered(&mut arena, ids[0]);
        assert_eq!(queue.iter_ids(&arena), vec![ids[0], ids[2], ids[1]]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.tail(), Some(ids[1]));
    }

    #[test]
    fn test_remove_relinks_neighbours() {
        let (mut arena, ids) = arena_with(3);
        let mut queue = TileReplacementQueue::new();
        for id in &ids {
            queue.mark_tile_rendered(&mut arena, *id);
        }
        queue.remove(&mut arena, ids[1]);
        assert_eq!(queue.iter_ids(&arena), vec![ids[2], ids[0]]);
        assert_eq!(queue.len(), 2);

        // Removing again is a no-op.
        queue.remove(&mut arena, ids[1]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_trim_spares_tiles_touched_this_frame() {
        let (mut arena, ids) = arena_with(4);
        let mut queue = TileReplacementQueue::new();
        for id in &ids {
            queue.mark_tile_rendered(&mut arena, *id);
        }

        // New frame: only ids[0] is touched.
        queue.mark_start_of_render_frame();
        queue.mark_tile_rendered(&mut arena, ids[0]);

        let evicted = queue.trim_tiles(&mut arena, 0, |queue, arena, id| {
            queue.remove(arena, id);
            arena.remove_subtree(id);
            true
        });
        assert_eq!(evicted, 3);
        assert_eq!(queue.iter_ids(&arena), vec![ids[0]]);
    }

    #[test]
    fn test_trim_stops_at_maximum() {
        let (mut arena, ids) = arena_with(5);
        let mut queue = TileReplacementQueue::new();
        for id in &ids {
            queue.mark_tile_rendered(&mut arena, *id);
        }
        queue.mark_start_of_render_frame();

        let evicted = queue.trim_tiles(&mut arena, 3, |queue, arena, id| {
            queue.remove(arena, id);
            arena.remove_subtree(id);
            true
        });
        assert_eq!(evicted, 2);
        // Oldest tiles go first.
        assert!(!arena.contains(ids[0]));
        assert!(!arena.contains(ids[1]));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_trim_skips_ineligible_tiles() {
        let (mut arena, ids) = arena_with(3);
        let mut queue = TileReplacementQueue::new();
        for id in &ids {
            queue.mark_tile_rendered(&mut arena, *id);
        }
        queue.mark_start_of_render_frame();

        let keep = ids[0];
        let evicted = queue.trim_tiles(&mut arena, 0, |queue, arena, id| {
            if id == keep {
                return false;
            }
            queue.remove(arena, id);
            arena.remove_subtree(id);
            true
        });
        assert_eq!(evicted, 2);
        assert_eq!(queue.iter_ids(&arena), vec![keep]);
    }
}
