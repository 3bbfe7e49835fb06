//! The ordered imagery layer stack.

use crate::imagery::{ImageryLayer, LayerId, LayerSnapshot};
use crate::imagery::layer::LayerSnapshotEntry;

/// Layers from bottom (index 0) to top.
#[derive(Debug, Default)]
pub struct ImageryLayerCollection {
    layers: Vec<(LayerId, ImageryLayer)>,
    next_id: u64,
}

impl ImageryLayerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer on top of the stack.
    pub fn add(&mut self, layer: ImageryLayer) -> LayerId {
        let index = self.layers.len();
        self.insert(layer, index)
    }

    /// Add a layer at `index`, clamped to the stack size.
    pub fn insert(&mut self, layer: ImageryLayer, index: usize) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        let index = index.min(self.layers.len());
        self.layers.insert(index, (id, layer));
        id
    }

    pub fn remove(&mut self, id: LayerId) -> Option<ImageryLayer> {
        let index = self.index_of(id)?;
        Some(self.layers.remove(index).1)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|(layer_id, _)| *layer_id == id)
    }

    pub fn get(&self, id: LayerId) -> Option<&ImageryLayer> {
        self.layers
            .iter()
            .find(|(layer_id, _)| *layer_id == id)
            .map(|(_, layer)| layer)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut ImageryLayer> {
        self.layers
            .iter_mut()
            .find(|(layer_id, _)| *layer_id == id)
            .map(|(_, layer)| layer)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &ImageryLayer)> {
        self.layers.iter().map(|(id, layer)| (*id, layer))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (LayerId, &mut ImageryLayer)> {
        self.layers.iter_mut().map(|(id, layer)| (*id, layer))
    }

    pub fn order(&self) -> Vec<LayerId> {
        self.layers.iter().map(|(id, _)| *id).collect()
    }

    /// Move a layer to `index`. Returns `false` if nothing changed.
    pub fn move_to(&mut self, id: LayerId, index: usize) -> bool {
        let Some(current) = self.index_of(id) else {
            return false;
        };
        let target = index.min(self.layers.len() - 1);
        if current == target {
            return false;
        }
        let entry = self.layers.remove(current);
        self.layers.insert(target, entry);
        true
    }

    pub fn raise(&mut self, id: LayerId) -> bool {
        match self.index_of(id) {
            Some(index) => self.move_to(id, index + 1),
            None => false,
        }
    }

    pub fn lower(&mut self, id: LayerId) -> bool {
        match self.index_of(id) {
            Some(index) if index > 0 => self.move_to(id, index - 1),
            _ => false,
        }
    }

    pub fn raise_to_top(&mut self, id: LayerId) -> bool {
        self.move_to(id, usize::MAX)
    }

    pub fn lower_to_bottom(&mut self, id: LayerId) -> bool {
        self.move_to(id, 0)
    }

    /// Freeze the current order and appearance for one frame.
    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot::new(
            self.layers
                .iter()
                .map(|(id, layer)| LayerSnapshotEntry {
                    id: *id,
                    drawn: layer.is_drawn(),
                    uniforms: layer.uniforms(),
                    cutout_rectangle: layer.cutout_rectangle,
                })
                .collect(),
        )
    }
}
