//! Height terrain resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::render::height_terrain::{RHeightTerrain, RHeightTerrainSector};

bitflags! {
    /// Aspects of a height terrain that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct HeightTerrainDirty: u32 {
        const SECTORS = 1 << 0;
    }
}

/// One terrain sector owned by the logic thread
#[derive(Debug, Clone)]
pub struct HeightTerrainSector {
    /// Sector grid coordinates
    pub coordinates: (i32, i32),
    /// Lowest height in the sector
    pub min_height: f32,
    /// Highest height in the sector
    pub max_height: f32,
}

/// Logic-side height terrain, an optional singleton member of a world
#[derive(Debug)]
pub struct HeightTerrain {
    sector_size: f64,
    sectors: Vec<HeightTerrainSector>,
    peer: HeightTerrainPeer,
}

impl HeightTerrain {
    /// Create a terrain with the given sector edge length
    pub fn new(ctx: &RenderContext, sector_size: f64) -> Result<Self, SceneError> {
        if sector_size <= 0.0 {
            return Err(SceneError::InvalidParam("sector_size must be positive"));
        }
        Ok(Self {
            sector_size,
            sectors: Vec::new(),
            peer: HeightTerrainPeer::new(ctx, sector_size),
        })
    }

    /// Edge length of one sector in meters
    pub fn sector_size(&self) -> f64 {
        self.sector_size
    }

    /// Number of sectors
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Replace the sector table
    pub fn set_sectors(&mut self, sectors: Vec<HeightTerrainSector>) {
        self.sectors = sectors;
        self.peer.notify_sectors_changed();
    }

    /// Update one sector's height range; unknown coordinates are ignored
    pub fn set_sector_heights(&mut self, coordinates: (i32, i32), min: f32, max: f32) {
        if let Some(sector) = self
            .sectors
            .iter_mut()
            .find(|s| s.coordinates == coordinates)
        {
            sector.min_height = min;
            sector.max_height = max;
            self.peer.notify_sectors_changed();
        }
    }

    /// The render mirror of this terrain
    pub fn render_terrain(&self) -> &Arc<RHeightTerrain> {
        self.peer.r_terrain()
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.sectors);
    }
}

/// Logic-thread shadow of a height terrain
#[derive(Debug)]
pub(crate) struct HeightTerrainPeer {
    ctx: RenderContext,
    r_terrain: Arc<RHeightTerrain>,
    dirty: HeightTerrainDirty,
}

impl HeightTerrainPeer {
    fn new(ctx: &RenderContext, sector_size: f64) -> Self {
        Self {
            ctx: ctx.clone(),
            r_terrain: Arc::new(RHeightTerrain::new(sector_size)),
            dirty: HeightTerrainDirty::all(),
        }
    }

    pub(crate) fn r_terrain(&self) -> &Arc<RHeightTerrain> {
        &self.r_terrain
    }

    fn notify_sectors_changed(&mut self) {
        self.dirty.insert(HeightTerrainDirty::SECTORS);
    }

    /// Push dirty aspects, clearing each processed bit
    fn sync_to_render(&mut self, sectors: &[HeightTerrainSector]) {
        if self.dirty.contains(HeightTerrainDirty::SECTORS) {
            let staged = sectors
                .iter()
                .map(|sector| RHeightTerrainSector {
                    coordinates: sector.coordinates,
                    min_height: sector.min_height,
                    max_height: sector.max_height,
                })
                .collect();
            self.r_terrain.set_sectors(staged);
            self.dirty.remove(HeightTerrainDirty::SECTORS);
        }
    }
}

impl Drop for HeightTerrainPeer {
    fn drop(&mut self) {
        if self.r_terrain.world_link().has_parent() {
            // the world's terrain slot is replaced during the next sync;
            // park our reference until the frame boundary
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_terrain.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
