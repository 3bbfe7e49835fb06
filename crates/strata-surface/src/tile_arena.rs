//! Slot arena owning every tile of the quadtree.

use rustc_hash::FxHashMap;
use strata_geo::TileKey;

use crate::tile::{Tile, TileId};

#[derive(Debug, Default)]
struct TileSlot {
    generation: u32,
    tile: Option<Tile>,
}

/// Owns all tiles and indexes them by id and by key.
#[derive(Debug, Default)]
pub(crate) struct TileArena {
    slots: Vec<TileSlot>,
    free: Vec<u32>,
    by_key: FxHashMap<TileKey, TileId>,
    roots: Vec<TileId>,
}

impl TileArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile: Tile) -> TileId {
        let key = tile.key;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.tile = Some(tile);
                TileId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(TileSlot {
                    generation: 0,
                    tile: Some(tile),
                });
                TileId::new(index, 0)
            }
        };
        self.by_key.insert(key, id);
        id
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.tile.as_ref())
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.tile.as_mut())
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.get(id).is_some()
    }

    pub fn find(&self, key: TileKey) -> Option<TileId> {
        self.by_key.get(&key).copied()
    }

    /// Remove a single tile, leaving its children and parent link untouched.
    fn remove(&mut self, id: TileId) -> Option<Tile> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let tile = slot.tile.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        if self.by_key.get(&tile.key) == Some(&id) {
            self.by_key.remove(&tile.key);
        }
        Some(tile)
    }

    /// Remove `id` and all of its descendants, clearing the parent's child
    /// slot. Returns the removed tiles, ancestors before descendants.
    pub fn remove_subtree(&mut self, id: TileId) -> Vec<Tile> {
        if let Some(parent) = self.get(id).and_then(|tile| tile.parent)
            && let Some(parent_tile) = self.get_mut(parent)
        {
            for slot in &mut parent_tile.children {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
        self.roots.retain(|root| *root != id);

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(tile) = self.remove(next) {
                pending.extend(tile.children.iter().flatten().copied());
                removed.push(tile);
            }
        }
        removed
    }

    /// Ids of `id` and all of its live descendants, ancestors first.
    pub fn subtree_ids(&self, id: TileId) -> Vec<TileId> {
        let mut ids = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(tile) = self.get(next) {
                ids.push(next);
                pending.extend(tile.children.iter().flatten().copied());
            }
        }
        ids
    }

    /// Remove every tile.
    pub fn clear(&mut self) -> Vec<Tile> {
        let mut removed = Vec::with_capacity(self.len());
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(tile) = slot.tile.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                removed.push(tile);
            }
        }
        self.by_key.clear();
        self.roots.clear();
        removed
    }

    pub fn roots(&self) -> &[TileId] {
        &self.roots
    }

    pub fn push_root(&mut self, id: TileId) {
        self.roots.push(id);
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.tile
                .as_ref()
                .map(|tile| (TileId::new(index as u32, slot.generation), tile))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TileId, &mut Tile)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.tile
                .as_mut()
                .map(|tile| (TileId::new(index as u32, generation), tile))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_geo::Rectangle;

    fn tile(key: TileKey, parent: Option<TileId>) -> Tile {
        Tile::new(key, Rectangle::MAX_VALUE, parent, (0.0, 0.0))
    }

    fn with_children(arena: &mut TileArena, parent: TileId) -> [TileId; 4] {
        let key = arena.get(parent).map(|t| t.key).expect("parent exists");
        let ids = key.children().map(|child| arena.insert(tile(child, Some(parent))));
        let parent_tile = arena.get_mut(parent).expect("parent exists");
        parent_tile.children = ids.map(Some);
        ids
    }

    #[test]
    fn test_insert_and_find_by_key() {
        let mut arena = TileArena::new();
        let key = TileKey::new(0, 1, 0);
        let id = arena.insert(tile(key, None));
        assert_eq!(arena.find(key), Some(id));
        assert_eq!(arena.get(id).map(|t| t.key), Some(key));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_remove_subtree_clears_parent_slot() {
        let mut arena = TileArena::new();
        let root = arena.insert(tile(TileKey::new(0, 0, 0), None));
        arena.push_root(root);
        let children = with_children(&mut arena, root);
        let grandchildren = with_children(&mut arena, children[1]);

        let subtree = arena.subtree_ids(children[1]);
        assert_eq!(subtree.len(), 5);
        assert_eq!(subtree[0], children[1]);

        let removed = arena.remove_subtree(children[1]);
        assert_eq!(removed.len(), 5);
        assert!(!arena.contains(children[1]));
        assert!(grandchildren.iter().all(|id| !arena.contains(*id)));

        let root_tile = arena.get(root).expect("root survives");
        assert_eq!(root_tile.children[1], None);
        assert_eq!(root_tile.children[0], Some(children[0]));
        assert_eq!(arena.len(), 4);
    }

    #[test]
    fn test_stale_id_does_not_resolve_after_reuse() {
        let mut arena = TileArena::new();
        let old = arena.insert(tile(TileKey::new(0, 0, 0), None));
        arena.remove_subtree(old);
        let new = arena.insert(tile(TileKey::new(0, 1, 0), None));
        assert_eq!(old.index(), new.index());
        assert!(arena.get(old).is_none());
        assert!(arena.get(new).is_some());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut arena = TileArena::new();
        let root = arena.insert(tile(TileKey::new(0, 0, 0), None));
        arena.push_root(root);
        with_children(&mut arena, root);
        assert_eq!(arena.clear().len(), 5);
        assert_eq!(arena.len(), 0);
        assert!(arena.roots().is_empty());
        assert!(arena.find(TileKey::new(0, 0, 0)).is_none());
    }
}
