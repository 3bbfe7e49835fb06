//! Reference-counted imagery tiles shared between terrain tiles.

use image::RgbaImage;
use rustc_hash::FxHashMap;
use strata_geo::{Rectangle, TileKey, TilingScheme};

use crate::error::LoadFailure;
use crate::resources::{RenderResources, TextureHandle};

/// Handle to an imagery tile in a layer's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageryId {
    index: u32,
    generation: u32,
}

impl ImageryId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Load state of one imagery tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageryState {
    /// Not requested yet, or the last request was throttled or dropped.
    Unloaded,
    /// Requested, waiting for the provider.
    Transitioning,
    /// Image received, texture not yet created.
    Received,
    /// Texture ready to sample.
    Ready,
    /// The provider reported a failure.
    Failed,
    /// The provider has nothing at this level.
    Invalid,
}

#[derive(Debug)]
pub(crate) struct Imagery {
    pub key: TileKey,
    pub rectangle: Rectangle,
    pub state: ImageryState,
    pub parent: Option<ImageryId>,
    pub image: Option<RgbaImage>,
    pub texture: Option<TextureHandle>,
    pub failure: Option<LoadFailure>,
    reference_count: u32,
}

impl Imagery {
    pub fn is_ready(&self) -> bool {
        self.state == ImageryState::Ready && self.texture.is_some()
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.state, ImageryState::Failed | ImageryState::Invalid)
    }
}

#[derive(Debug, Default)]
struct ImagerySlot {
    generation: u32,
    imagery: Option<Imagery>,
}

/// Per-layer cache of imagery tiles.
///
/// Each terrain tile binding holds one reference; each imagery holds one on
/// its parent so ancestors stay around as fallbacks. An imagery is freed,
/// and its texture released, when its count reaches zero.
#[derive(Debug, Default)]
pub(crate) struct ImageryCache {
    slots: Vec<ImagerySlot>,
    free: Vec<u32>,
    lookup: FxHashMap<TileKey, ImageryId>,
}

impl ImageryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ImageryId) -> Option<&Imagery> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.imagery.as_ref())
    }

    pub fn get_mut(&mut self, id: ImageryId) -> Option<&mut Imagery> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.imagery.as_mut())
    }

    /// Return the imagery for `key`, creating it (and its ancestors) if
    /// needed, with one new reference held by the caller.
    pub fn get_or_create(&mut self, key: TileKey, scheme: &TilingScheme) -> ImageryId {
        if let Some(id) = self.lookup.get(&key).copied() {
            self.add_reference(id);
            return id;
        }

        let parent = key.parent().map(|parent_key| self.get_or_create(parent_key, scheme));
        let imagery = Imagery {
            key,
            rectangle: scheme.tile_xy_to_rectangle(key),
            state: ImageryState::Unloaded,
            parent,
            image: None,
            texture: None,
            failure: None,
            reference_count: 1,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.imagery = Some(imagery);
                ImageryId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(ImagerySlot {
                    generation: 0,
                    imagery: Some(imagery),
                });
                ImageryId::new(index, 0)
            }
        };
        self.lookup.insert(key, id);
        id
    }

    pub fn add_reference(&mut self, id: ImageryId) {
        if let Some(imagery) = self.get_mut(id) {
            imagery.reference_count += 1;
        }
    }

    /// Drop one reference, freeing the imagery and walking up to its
    /// ancestors as their counts reach zero.
    pub fn release(&mut self, id: ImageryId, resources: &mut dyn RenderResources) {
        let mut next = Some(id);
        while let Some(current) = next.take() {
            let Some(slot) = self.slots.get_mut(current.index as usize) else {
                return;
            };
            if slot.generation != current.generation {
                return;
            }
            let Some(imagery) = slot.imagery.as_mut() else {
                return;
            };
            imagery.reference_count = imagery.reference_count.saturating_sub(1);
            if imagery.reference_count > 0 {
                return;
            }

            let Some(freed) = slot.imagery.take() else {
                return;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            if self.lookup.get(&freed.key) == Some(&current) {
                self.lookup.remove(&freed.key);
            }
            if let Some(texture) = freed.texture {
                resources.release_texture(texture);
            }
            next = freed.parent;
        }
    }

    /// Forget the key index so future lookups create fresh imagery. Live
    /// imagery stays until its references are released.
    pub fn clear_lookup(&mut self) {
        self.lookup.clear();
    }

    /// Free everything regardless of reference counts.
    pub fn release_all(&mut self, resources: &mut dyn RenderResources) {
        for slot in &mut self.slots {
            if let Some(imagery) = slot.imagery.take() {
                slot.generation = slot.generation.wrapping_add(1);
                if let Some(texture) = imagery.texture {
                    resources.release_texture(texture);
                }
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.lookup.clear();
    }

    /// Number of live imagery tiles.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.imagery.is_some()).count()
    }
}
