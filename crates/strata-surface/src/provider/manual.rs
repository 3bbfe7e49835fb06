//! Providers that hold every request until the caller resolves it.
//!
//! Used to drive loading step by step, out of order, or into failure.

use std::sync::{Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use rustc_hash::FxHashMap;
use strata_geo::{Ellipsoid, Rectangle, TileKey, TilingScheme};

use super::{Credit, ImageryProvider, TerrainData, TerrainProvider, estimated_level_zero_geometric_error};
use crate::error::LoadFailure;
use crate::request::Responder;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Pending<T> {
    requests: Vec<(TileKey, Responder<T>)>,
    throttled: bool,
    total_requests: usize,
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            throttled: false,
            total_requests: 0,
        }
    }
}

impl<T> Pending<T> {
    fn accept(&mut self, key: TileKey, responder: Responder<T>) -> Result<(), Responder<T>> {
        if self.throttled {
            return Err(responder);
        }
        self.total_requests += 1;
        self.requests.push((key, responder));
        Ok(())
    }

    fn take(&mut self, key: TileKey) -> Option<Responder<T>> {
        let index = self.requests.iter().position(|(pending, _)| *pending == key)?;
        Some(self.requests.remove(index).1)
    }
}

/// Terrain provider over a geographic scheme whose requests wait for the
/// caller.
#[derive(Debug)]
pub struct ManualTerrainProvider {
    tiling_scheme: TilingScheme,
    level_zero_maximum_geometric_error: f64,
    maximum_level: u32,
    availability: FxHashMap<TileKey, bool>,
    credits: Vec<Credit>,
    pending: Mutex<Pending<TerrainData>>,
}

impl ManualTerrainProvider {
    pub fn new() -> Self {
        let tiling_scheme = TilingScheme::geographic(Ellipsoid::WGS84);
        let level_zero_maximum_geometric_error =
            estimated_level_zero_geometric_error(&Ellipsoid::WGS84, 64, tiling_scheme.number_of_x_tiles_at_level(0));
        Self {
            tiling_scheme,
            level_zero_maximum_geometric_error,
            maximum_level: 20,
            availability: FxHashMap::default(),
            credits: Vec::new(),
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn with_maximum_level(mut self, maximum_level: u32) -> Self {
        self.maximum_level = maximum_level;
        self
    }

    /// Report `key` as having (or lacking) data.
    pub fn with_availability(mut self, key: TileKey, available: bool) -> Self {
        self.availability.insert(key, available);
        self
    }

    pub fn with_credit(mut self, credit: Credit) -> Self {
        self.credits.push(credit);
        self
    }

    /// While set, every request is handed back unaccepted.
    pub fn set_throttled(&self, throttled: bool) {
        lock(&self.pending).throttled = throttled;
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).requests.len()
    }

    pub fn pending_keys(&self) -> Vec<TileKey> {
        lock(&self.pending).requests.iter().map(|(key, _)| *key).collect()
    }

    /// Requests accepted so far, resolved or not.
    pub fn request_count(&self) -> usize {
        lock(&self.pending).total_requests
    }

    pub fn resolve(&self, key: TileKey, result: Result<TerrainData, LoadFailure>) -> bool {
        let responder = lock(&self.pending).take(key);
        match responder {
            Some(responder) => {
                responder.resolve(result);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, key: TileKey, failure: LoadFailure) -> bool {
        self.resolve(key, Err(failure))
    }

    /// Resolve every pending request with a flat tile. Returns how many
    /// were resolved.
    pub fn resolve_all(&self) -> usize {
        let requests = std::mem::take(&mut lock(&self.pending).requests);
        let count = requests.len();
        for (_, responder) in requests {
            responder.resolve(Ok(TerrainData::flat(16, 16)));
        }
        count
    }

    /// Drop every pending responder unresolved.
    pub fn abandon_all(&self) -> usize {
        let requests = std::mem::take(&mut lock(&self.pending).requests);
        requests.len()
    }
}

impl Default for ManualTerrainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainProvider for ManualTerrainProvider {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_maximum_geometric_error / f64::from(1u32 << level.min(31))
    }

    fn maximum_level(&self) -> u32 {
        self.maximum_level
    }

    fn tile_data_available(&self, key: TileKey) -> Option<bool> {
        self.availability.get(&key).copied()
    }

    fn credits(&self) -> Vec<Credit> {
        self.credits.clone()
    }

    fn request_tile(
        &self,
        key: TileKey,
        responder: Responder<TerrainData>,
    ) -> Result<(), Responder<TerrainData>> {
        lock(&self.pending).accept(key, responder)
    }
}

/// Imagery provider whose requests wait for the caller.
#[derive(Debug)]
pub struct ManualImageryProvider {
    tiling_scheme: TilingScheme,
    tile_size: u32,
    maximum_level: u32,
    credits: Vec<Credit>,
    pending: Mutex<Pending<RgbaImage>>,
}

impl ManualImageryProvider {
    /// A geographic scheme with square tiles of `tile_size` pixels.
    pub fn new(tile_size: u32, maximum_level: u32) -> Self {
        Self::with_rectangle(Rectangle::MAX_VALUE, tile_size, maximum_level)
    }

    pub fn with_rectangle(rectangle: Rectangle, tile_size: u32, maximum_level: u32) -> Self {
        Self {
            tiling_scheme: TilingScheme::new(rectangle, Ellipsoid::WGS84, 2, 1),
            tile_size: tile_size.max(1),
            maximum_level,
            credits: Vec::new(),
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn with_credit(mut self, credit: Credit) -> Self {
        self.credits.push(credit);
        self
    }

    pub fn set_throttled(&self, throttled: bool) {
        lock(&self.pending).throttled = throttled;
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).requests.len()
    }

    pub fn pending_keys(&self) -> Vec<TileKey> {
        lock(&self.pending).requests.iter().map(|(key, _)| *key).collect()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.pending).total_requests
    }

    pub fn resolve(&self, key: TileKey, result: Result<RgbaImage, LoadFailure>) -> bool {
        let responder = lock(&self.pending).take(key);
        match responder {
            Some(responder) => {
                responder.resolve(result);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, key: TileKey, failure: LoadFailure) -> bool {
        self.resolve(key, Err(failure))
    }

    /// Resolve every pending request with a uniform image of `color`.
    pub fn resolve_all(&self, color: [u8; 4]) -> usize {
        let requests = std::mem::take(&mut lock(&self.pending).requests);
        let count = requests.len();
        for (_, responder) in requests {
            responder.resolve(Ok(RgbaImage::from_pixel(self.tile_size, self.tile_size, Rgba(color))));
        }
        count
    }

    /// Fail every pending request.
    pub fn fail_all(&self, failure: &LoadFailure) -> usize {
        let requests = std::mem::take(&mut lock(&self.pending).requests);
        let count = requests.len();
        for (_, responder) in requests {
            responder.resolve(Err(failure.clone()));
        }
        count
    }
}

impl ImageryProvider for ManualImageryProvider {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn tile_width(&self) -> u32 {
        self.tile_size
    }

    fn tile_height(&self) -> u32 {
        self.tile_size
    }

    fn maximum_level(&self) -> u32 {
        self.maximum_level
    }

    fn credits(&self) -> Vec<Credit> {
        self.credits.clone()
    }

    fn request_image(
        &self,
        key: TileKey,
        responder: Responder<RgbaImage>,
    ) -> Result<(), Responder<RgbaImage>> {
        lock(&self.pending).accept(key, responder)
    }
}
