//! Keeps each tile's imagery bindings consistent with the layer stack.
//!
//! Entries on a tile are ordered bottom layer first. Every structural change
//! (add, remove, reorder, reload) goes through the functions here so that
//! order is preserved and imagery references are counted correctly.

use std::sync::Arc;

use glam::DVec4;
use strata_geo::{Cartographic, Rectangle, TileKey};

use crate::imagery::{ImageryCache, ImageryId, ImageryLayer, ImageryLayerCollection, ImageryState, LayerId, TileImagery};
use crate::provider::{ImageryProvider, TerrainProvider};
use crate::request::{CompletionQueue, ImageryToken};
use crate::resources::RenderResources;
use crate::statistics::SurfaceStatistics;
use crate::tile::{ReloadCallback, Tile};

/// Fraction of a terrain tile below which imagery tile edges are treated as
/// coincident with the terrain tile's edges.
const VERY_CLOSE_DIVISOR: f64 = 512.0;

/// Collaborators needed to drive imagery loads.
pub(crate) struct AssociationContext<'a> {
    pub completions: &'a CompletionQueue,
    pub resources: &'a mut dyn RenderResources,
    pub stats: &'a mut SurfaceStatistics,
}

/// Pick the imagery level whose texel spacing best matches the terrain
/// tile's geometric error.
pub(crate) fn imagery_level_for(provider: &dyn ImageryProvider, target_geometric_error: f64) -> u32 {
    let scheme = provider.tiling_scheme();
    let level_zero_texel_spacing = scheme.ellipsoid().maximum_radius() * scheme.rectangle().width()
        / (f64::from(provider.tile_width()) * f64::from(scheme.number_of_x_tiles_at_level(0)));
    let level = (level_zero_texel_spacing / target_geometric_error).log2().round();
    let level = if level.is_finite() && level > 0.0 { level as u32 } else { 0 };
    level.min(provider.maximum_level()).max(provider.minimum_level())
}

/// Offset and scale that map terrain texture coordinates into the imagery
/// tile covering them.
pub(crate) fn texture_translation_and_scale(terrain: &Rectangle, imagery: &Rectangle) -> DVec4 {
    let terrain_width = terrain.width();
    let terrain_height = terrain.height();
    let scale_x = terrain_width / imagery.width();
    let scale_y = terrain_height / imagery.height();
    DVec4::new(
        scale_x * (terrain.west - imagery.west) / terrain_width,
        scale_y * (terrain.south - imagery.south) / terrain_height,
        scale_x,
        scale_y,
    )
}

/// Snap a terrain rectangle that lies outside the base layer's bounds onto
/// the nearest edge, so edge texels are stretched across it.
fn clamp_to_bounds(terrain: &Rectangle, bounds: &Rectangle) -> Rectangle {
    let mut rectangle = *terrain;
    if terrain.south >= bounds.north {
        rectangle.north = bounds.north;
        rectangle.south = bounds.north;
    } else if terrain.north <= bounds.south {
        rectangle.north = bounds.south;
        rectangle.south = bounds.south;
    } else {
        rectangle.south = terrain.south.max(bounds.south);
        rectangle.north = terrain.north.min(bounds.north);
    }

    if terrain.west >= bounds.east {
        rectangle.west = bounds.east;
        rectangle.east = bounds.east;
    } else if terrain.east <= bounds.west {
        rectangle.west = bounds.west;
        rectangle.east = bounds.west;
    } else {
        rectangle.west = terrain.west.max(bounds.west);
        rectangle.east = terrain.east.min(bounds.east);
    }
    rectangle
}

/// Create loading entries on `tile` for every imagery tile of `layer`
/// overlapping it, inserted at `insertion_point` (end of list when `None`).
///
/// Returns `false` when the layer contributes nothing to this tile.
pub(crate) fn create_tile_imagery_skeletons(
    tile: &mut Tile,
    layer_id: LayerId,
    layer: &mut ImageryLayer,
    is_base_layer: bool,
    terrain: &dyn TerrainProvider,
    insertion_point: Option<usize>,
) -> bool {
    if !layer.covers_terrain_level(tile.key.level) {
        return false;
    }

    let provider = Arc::clone(layer.provider());
    let scheme = provider.tiling_scheme();
    let Some(imagery_bounds) = provider.rectangle().intersection(layer.rectangle()) else {
        return false;
    };

    let terrain_rectangle = tile.rectangle;
    let rectangle = match terrain_rectangle.intersection(&imagery_bounds) {
        Some(overlap) => overlap,
        None if is_base_layer => clamp_to_bounds(&terrain_rectangle, &imagery_bounds),
        None => return false,
    };

    let target_error = terrain.level_maximum_geometric_error(tile.key.level);
    let level = imagery_level_for(provider.as_ref(), target_error);

    let northwest = Cartographic::new(rectangle.west, rectangle.north, 0.0);
    let southeast = Cartographic::new(rectangle.east, rectangle.south, 0.0);
    let (Some(mut nw), Some(mut se)) = (
        scheme.position_to_tile_xy(&northwest, level),
        scheme.position_to_tile_xy(&southeast, level),
    ) else {
        tracing::debug!(tile = %tile.key, ?layer_id, "imagery rectangle outside its tiling scheme");
        return false;
    };

    // Drop the outermost imagery row or column when the terrain tile only
    // grazes it.
    let very_close_x = terrain_rectangle.width() / VERY_CLOSE_DIVISOR;
    let very_close_y = terrain_rectangle.height() / VERY_CLOSE_DIVISOR;

    let nw_rectangle = scheme.tile_xy_to_rectangle(nw);
    if (nw_rectangle.south - rectangle.north).abs() < very_close_y && nw.y < se.y {
        nw.y += 1;
    }
    if (nw_rectangle.east - rectangle.west).abs() < very_close_x && nw.x < se.x {
        nw.x += 1;
    }
    let se_rectangle = scheme.tile_xy_to_rectangle(se);
    if (se_rectangle.north - rectangle.south).abs() < very_close_y && se.y > nw.y {
        se.y -= 1;
    }
    if (se_rectangle.west - rectangle.east).abs() < very_close_x && se.x > nw.x {
        se.x -= 1;
    }

    let terrain_width = terrain_rectangle.width();
    let terrain_height = terrain_rectangle.height();

    let mut max_u = 0.0_f64;
    let mut min_v = 1.0_f64;
    if !is_base_layer
        && let Some(clipped) = scheme
            .tile_xy_to_rectangle(TileKey::new(level, nw.x, nw.y))
            .intersection(&imagery_bounds)
    {
        if (clipped.west - terrain_rectangle.west).abs() >= very_close_x {
            max_u = ((clipped.west - terrain_rectangle.west) / terrain_width).clamp(0.0, 1.0);
        }
        if (clipped.north - terrain_rectangle.north).abs() >= very_close_y {
            min_v = ((clipped.north - terrain_rectangle.south) / terrain_height).clamp(0.0, 1.0);
        }
    }

    let initial_min_v = min_v;
    let mut insertion = insertion_point.unwrap_or(tile.imagery.len()).min(tile.imagery.len());
    for x in nw.x..=se.x {
        let min_u = max_u;
        let Some(column) = scheme
            .tile_xy_to_rectangle(TileKey::new(level, x, nw.y))
            .intersection(&imagery_bounds)
        else {
            continue;
        };
        max_u = ((column.east - terrain_rectangle.west) / terrain_width).min(1.0);
        if x == se.x && (is_base_layer || (column.east - terrain_rectangle.east).abs() < very_close_x) {
            max_u = 1.0;
        }

        min_v = initial_min_v;
        for y in nw.y..=se.y {
            let max_v = min_v;
            let key = TileKey::new(level, x, y);
            let Some(cell) = scheme.tile_xy_to_rectangle(key).intersection(&imagery_bounds) else {
                continue;
            };
            min_v = ((cell.south - terrain_rectangle.south) / terrain_height).max(0.0);
            if y == se.y && (is_base_layer || (cell.south - terrain_rectangle.south).abs() < very_close_y) {
                min_v = 0.0;
            }

            let imagery = layer.cache.get_or_create(key, scheme);
            tile.imagery.insert(
                insertion,
                TileImagery::skeleton(layer_id, imagery, DVec4::new(min_u, min_v, max_u, max_v)),
            );
            insertion += 1;
        }
    }
    true
}

/// Add `layer_id`'s entries to a tile at the position matching its place
/// in `order`. Does nothing if the tile already has entries for the layer.
pub(crate) fn insert_layer_entries(
    tile: &mut Tile,
    layer_id: LayerId,
    layer: &mut ImageryLayer,
    order: &[LayerId],
    terrain: &dyn TerrainProvider,
) -> bool {
    if tile.imagery.iter().any(|entry| entry.layer == layer_id) {
        return false;
    }
    let Some(stack_index) = order.iter().position(|id| *id == layer_id) else {
        return false;
    };
    let insertion = tile
        .imagery
        .iter()
        .position(|entry| {
            order
                .iter()
                .position(|id| *id == entry.layer)
                .is_none_or(|index| index > stack_index)
        })
        .unwrap_or(tile.imagery.len());
    create_tile_imagery_skeletons(tile, layer_id, layer, stack_index == 0, terrain, Some(insertion))
}

fn release_entry(entry: &TileImagery, cache: &mut ImageryCache, resources: &mut dyn RenderResources) {
    for id in [entry.ready, entry.loading, entry.fallback].into_iter().flatten() {
        cache.release(id, resources);
    }
}

/// Drop every entry and pending reload for `layer_id` from a tile.
pub(crate) fn remove_layer_entries(
    tile: &mut Tile,
    layer_id: LayerId,
    cache: &mut ImageryCache,
    resources: &mut dyn RenderResources,
) -> usize {
    let before = tile.imagery.len();
    tile.imagery.retain(|entry| {
        if entry.layer == layer_id {
            release_entry(entry, cache, resources);
            false
        } else {
            true
        }
    });
    tile.reload_callbacks.retain(|callback| callback.layer != layer_id);
    before - tile.imagery.len()
}

/// Stable-sort a tile's entries into stack order. Entries are moved, never
/// recreated, so loaded imagery is kept.
pub(crate) fn sort_entries_by_layer_order(tile: &mut Tile, order: &[LayerId]) {
    tile.imagery
        .sort_by_key(|entry| order.iter().position(|id| *id == entry.layer).unwrap_or(usize::MAX));
}

/// Start the load of one imagery tile or turn its received image into a
/// texture.
fn process_imagery(layer: &mut ImageryLayer, layer_id: LayerId, id: ImageryId, ctx: &mut AssociationContext<'_>) {
    let Some(imagery) = layer.cache.get_mut(id) else {
        return;
    };
    match imagery.state {
        ImageryState::Unloaded => {
            let key = imagery.key;
            imagery.state = ImageryState::Transitioning;
            let responder = ctx.completions.imagery_responder(ImageryToken { layer: layer_id, imagery: id });
            ctx.stats.imagery_requests += 1;
            if let Err(responder) = layer.provider().request_image(key, responder) {
                responder.disarm();
                ctx.stats.throttled_requests += 1;
                if let Some(imagery) = layer.cache.get_mut(id) {
                    imagery.state = ImageryState::Unloaded;
                }
            }
        }
        ImageryState::Received => match imagery.image.take() {
            Some(image) => {
                imagery.texture = Some(ctx.resources.create_texture(&image));
                imagery.state = ImageryState::Ready;
            }
            None => imagery.state = ImageryState::Unloaded,
        },
        _ => {}
    }
}

/// Advance one tile binding. Returns `true` once it has settled, either on
/// its own imagery or on the best ancestor available after a failure.
fn process_entry(
    entry: &mut TileImagery,
    terrain_rectangle: &Rectangle,
    layer: &mut ImageryLayer,
    ctx: &mut AssociationContext<'_>,
) -> bool {
    let Some(loading) = entry.loading else {
        return true;
    };
    process_imagery(layer, entry.layer, loading, ctx);

    let Some(imagery) = layer.cache.get(loading) else {
        entry.loading = None;
        return true;
    };
    let loading_ready = imagery.is_ready();
    let loading_failed = imagery.is_terminal_failure();
    let loading_rectangle = imagery.rectangle;
    let mut ancestor = imagery.parent;

    if loading_ready {
        for stale in [entry.fallback.take(), entry.ready.take()].into_iter().flatten() {
            layer.cache.release(stale, ctx.resources);
        }
        entry.ready = Some(loading);
        entry.loading = None;
        entry.translation_and_scale = Some(texture_translation_and_scale(terrain_rectangle, &loading_rectangle));
        return true;
    }

    // Closest ready ancestor to draw meanwhile, and the closest one still
    // worth loading.
    let mut ancestor_rectangle = None;
    let mut closest_needing_load = None;
    while let Some(candidate) = ancestor {
        let Some(imagery) = layer.cache.get(candidate) else {
            ancestor = None;
            break;
        };
        if imagery.is_ready() {
            ancestor_rectangle = Some(imagery.rectangle);
            break;
        }
        if !imagery.is_terminal_failure() && closest_needing_load.is_none() {
            closest_needing_load = Some(candidate);
        }
        ancestor = imagery.parent;
    }

    if entry.fallback != ancestor {
        if let Some(old) = entry.fallback.take() {
            layer.cache.release(old, ctx.resources);
        }
        entry.translation_and_scale = None;
        if let (Some(id), Some(rectangle)) = (ancestor, ancestor_rectangle) {
            layer.cache.add_reference(id);
            entry.fallback = Some(id);
            entry.translation_and_scale = Some(texture_translation_and_scale(terrain_rectangle, &rectangle));
        }
    }

    if loading_failed {
        if let Some(pending) = closest_needing_load {
            // Ancestors not bound to any tile would otherwise never load.
            process_imagery(layer, entry.layer, pending, ctx);
            return false;
        }
        if let Some(substitute) = entry.fallback.take() {
            entry.ready = Some(substitute);
            entry.loading = None;
            layer.cache.release(loading, ctx.resources);
        }
        return true;
    }
    false
}

/// Advance every imagery binding on a tile. Returns `true` when all of
/// them have settled.
pub(crate) fn process_tile_imagery(
    tile: &mut Tile,
    layers: &mut ImageryLayerCollection,
    ctx: &mut AssociationContext<'_>,
) -> bool {
    let rectangle = tile.rectangle;
    let mut done = true;
    for entry in &mut tile.imagery {
        let Some(layer) = layers.get_mut(entry.layer) else {
            continue;
        };
        if !process_entry(entry, &rectangle, layer, ctx) {
            done = false;
        }
    }
    done
}

/// Finish pending reloads on a fully loaded tile: drop the stale entries
/// each reload replaced. Callbacks whose replacement entries are missing
/// recreate them and stay registered.
pub(crate) fn run_reload_callbacks(
    tile: &mut Tile,
    layers: &mut ImageryLayerCollection,
    terrain: &dyn TerrainProvider,
    resources: &mut dyn RenderResources,
) {
    let callbacks = std::mem::take(&mut tile.reload_callbacks);
    let mut pending = Vec::new();
    for callback in callbacks {
        let is_base_layer = layers.index_of(callback.layer) == Some(0);
        let Some(layer) = layers.get_mut(callback.layer) else {
            continue;
        };
        let Some(start) = tile.imagery.iter().position(|entry| entry.layer == callback.layer) else {
            continue;
        };
        let end = start + callback.stale_entries;
        if tile.imagery.get(end).is_none_or(|entry| entry.layer != callback.layer) {
            if create_tile_imagery_skeletons(tile, callback.layer, layer, is_base_layer, terrain, Some(end)) {
                pending.push(callback);
            }
            continue;
        }
        for entry in tile.imagery.drain(start..end) {
            release_entry(&entry, &mut layer.cache, resources);
        }
    }
    tile.reload_callbacks = pending;
}

/// Register a reload of `layer_id` on a tile: new loading entries go right
/// after the existing ones. Ignored if a reload is already pending or if no
/// entry for the layer is ready yet; such tiles have nothing stale on screen.
pub(crate) fn begin_reload(
    tile: &mut Tile,
    layer_id: LayerId,
    layer: &mut ImageryLayer,
    is_base_layer: bool,
    terrain: &dyn TerrainProvider,
) -> bool {
    if tile.reload_callbacks.iter().any(|callback| callback.layer == layer_id) {
        return false;
    }
    let Some(start) = tile.imagery.iter().position(|entry| entry.layer == layer_id) else {
        return false;
    };
    let stale_entries = tile.imagery[start..]
        .iter()
        .take_while(|entry| entry.layer == layer_id)
        .count();
    if !tile.imagery[start..start + stale_entries].iter().any(TileImagery::is_ready) {
        return false;
    }
    if !create_tile_imagery_skeletons(tile, layer_id, layer, is_base_layer, terrain, Some(start + stale_entries)) {
        return false;
    }
    tile.reload_callbacks.push(ReloadCallback {
        layer: layer_id,
        stale_entries,
    });
    true
}

#[cfg(test)]
#[path = "association_tests.rs"]
mod tests;
