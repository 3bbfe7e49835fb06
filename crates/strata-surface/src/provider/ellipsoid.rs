//! Terrain provider for a smooth ellipsoid with no height data.

use strata_geo::{Ellipsoid, TileKey, TilingScheme};

use super::{Credit, TerrainData, TerrainProvider, estimated_level_zero_geometric_error};
use crate::request::Responder;

/// Samples per tile edge of the flat heightmaps this provider returns.
const TILE_SAMPLES: u32 = 64;

/// Answers every request immediately with a flat heightmap at height zero.
#[derive(Clone, Debug)]
pub struct EllipsoidTerrainProvider {
    tiling_scheme: TilingScheme,
    level_zero_maximum_geometric_error: f64,
    credits: Vec<Credit>,
}

impl EllipsoidTerrainProvider {
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        let tiling_scheme = TilingScheme::geographic(ellipsoid);
        let level_zero_maximum_geometric_error = estimated_level_zero_geometric_error(
            &ellipsoid,
            TILE_SAMPLES,
            tiling_scheme.number_of_x_tiles_at_level(0),
        );
        Self {
            tiling_scheme,
            level_zero_maximum_geometric_error,
            credits: Vec::new(),
        }
    }

    pub fn with_credit(mut self, credit: Credit) -> Self {
        self.credits.push(credit);
        self
    }
}

impl Default for EllipsoidTerrainProvider {
    fn default() -> Self {
        Self::new(Ellipsoid::WGS84)
    }
}

impl TerrainProvider for EllipsoidTerrainProvider {
    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn level_maximum_geometric_error(&self, level: u32) -> f64 {
        self.level_zero_maximum_geometric_error / f64::from(1u32 << level.min(31))
    }

    fn credits(&self) -> Vec<Credit> {
        self.credits.clone()
    }

    fn request_tile(
        &self,
        _key: TileKey,
        responder: Responder<TerrainData>,
    ) -> Result<(), Responder<TerrainData>> {
        responder.resolve(Ok(TerrainData::flat(TILE_SAMPLES, TILE_SAMPLES)));
        Ok(())
    }
}
