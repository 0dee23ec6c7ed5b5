//! Render-side height terrain
//!
//! The terrain is an optional singleton member of a world, organized in
//! square sectors on a grid. The render side keeps per-sector height ranges
//! for culling; mesh generation is downstream of this core.

use std::sync::{Arc, RwLock};

use crate::foundation::math::DVec3;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::DAabb;

/// Height range of one terrain sector
#[derive(Debug, Clone, Copy)]
pub struct RHeightTerrainSector {
    /// Sector grid coordinates
    pub coordinates: (i32, i32),
    /// Lowest height in the sector
    pub min_height: f32,
    /// Highest height in the sector
    pub max_height: f32,
}

/// State behind the terrain's lock
#[derive(Debug)]
struct RHeightTerrainState {
    sector_size: f64,
    sectors: Vec<RHeightTerrainSector>,
    dirty_sectors: bool,
}

/// Reference-counted render-side height terrain
#[derive(Debug)]
pub struct RHeightTerrain {
    link: WorldLink,
    state: RwLock<RHeightTerrainState>,
}

impl RHeightTerrain {
    pub(crate) fn new(sector_size: f64) -> Self {
        Self {
            link: WorldLink::new(),
            state: RwLock::new(RHeightTerrainState {
                sector_size,
                sectors: Vec::new(),
                dirty_sectors: false,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    /// World this terrain is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Edge length of one sector in meters
    pub fn sector_size(&self) -> f64 {
        self.state.read().unwrap().sector_size
    }

    /// Number of sectors
    pub fn sector_count(&self) -> usize {
        self.state.read().unwrap().sectors.len()
    }

    /// World-space bounds of a sector, None if out of range
    pub fn sector_bounds(&self, index: usize) -> Option<DAabb> {
        let state = self.state.read().unwrap();
        state.sectors.get(index).map(|sector| {
            let size = state.sector_size;
            let base_x = f64::from(sector.coordinates.0) * size;
            let base_z = f64::from(sector.coordinates.1) * size;
            DAabb::new(
                DVec3::new(base_x, f64::from(sector.min_height), base_z),
                DVec3::new(
                    base_x + size,
                    f64::from(sector.max_height),
                    base_z + size,
                ),
            )
        })
    }

    pub(crate) fn set_sectors(&self, sectors: Vec<RHeightTerrainSector>) {
        let mut state = self.state.write().unwrap();
        state.sectors = sectors;
        state.dirty_sectors = true;
    }

    /// Finish sector updates; render thread only
    pub fn prepare_for_render(&self) {
        let mut state = self.state.write().unwrap();
        if !state.dirty_sectors {
            return;
        }
        // sector meshes rebuild downstream; the flag flip publishes which
        // frame picked up the new height ranges
        state.dirty_sectors = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_bounds() {
        let terrain = RHeightTerrain::new(64.0);
        terrain.set_sectors(vec![RHeightTerrainSector {
            coordinates: (1, -1),
            min_height: -5.0,
            max_height: 20.0,
        }]);

        let bounds = terrain.sector_bounds(0).unwrap();
        assert_eq!(bounds.min, DVec3::new(64.0, -5.0, -64.0));
        assert_eq!(bounds.max, DVec3::new(128.0, 20.0, 0.0));
        assert!(terrain.sector_bounds(1).is_none());
    }
}
