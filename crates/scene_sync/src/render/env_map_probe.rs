//! Render-side environment map probe
//!
//! A probe owns one [`REnvMap`] and registers it with the world's env-map
//! list while the probe is attached. The map itself is what components and
//! billboards resolve against; the probe only manages placement, influence
//! and the update budget.

use std::sync::{Arc, RwLock};

use crate::foundation::math::{DMat4, DVec3};
use crate::render::env_map::REnvMap;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::DAabb;
use crate::spatial::SpatialLink;

/// State behind the probe's lock
#[derive(Debug)]
struct REnvMapProbeState {
    matrix: DMat4,
    influence_area: DAabb,
    influence_border: f32,
    influence_priority: i32,
    reflection_shape: Option<DAabb>,
}

/// Reference-counted render-side environment map probe
#[derive(Debug)]
pub struct REnvMapProbe {
    link: WorldLink,
    spatial: SpatialLink,
    env_map: Arc<REnvMap>,
    state: RwLock<REnvMapProbeState>,
}

impl REnvMapProbe {
    pub(crate) fn new(spatial: SpatialLink, env_map_size: u32) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            env_map: Arc::new(REnvMap::new(env_map_size)),
            state: RwLock::new(REnvMapProbeState {
                matrix: DMat4::identity(),
                influence_area: DAabb::from_center_extents(
                    DVec3::zeros(),
                    DVec3::new(1.0, 1.0, 1.0),
                ),
                influence_border: 0.1,
                influence_priority: 0,
                reflection_shape: None,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    pub(crate) fn spatial_link(&self) -> &SpatialLink {
        &self.spatial
    }

    /// World this probe is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// The environment map owned by this probe
    pub fn env_map(&self) -> &Arc<REnvMap> {
        &self.env_map
    }

    /// World matrix from the last sync
    pub fn matrix(&self) -> DMat4 {
        self.state.read().unwrap().matrix
    }

    /// World-space influence bounds
    pub fn influence_area(&self) -> DAabb {
        self.state.read().unwrap().influence_area
    }

    /// Fade border width around the influence area
    pub fn influence_border(&self) -> f32 {
        self.state.read().unwrap().influence_border
    }

    /// Probes with higher priority win in overlapping regions
    pub fn influence_priority(&self) -> i32 {
        self.state.read().unwrap().influence_priority
    }

    /// Optional box reflection shape
    pub fn reflection_shape(&self) -> Option<DAabb> {
        self.state.read().unwrap().reflection_shape
    }

    /// Update placement; derives the env map position from the matrix
    pub(crate) fn set_matrix(&self, matrix: DMat4, influence_area: DAabb) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.matrix = matrix;
        state.influence_area = influence_area;
        let position = DVec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        self.env_map.set_position(position);
        self.env_map.invalidate();
        influence_area
    }

    pub(crate) fn set_influence(&self, border: f32, priority: i32) {
        let mut state = self.state.write().unwrap();
        state.influence_border = border;
        state.influence_priority = priority;
        self.env_map.set_influence_priority(priority);
    }

    pub(crate) fn set_reflection_shape(&self, shape: Option<DAabb>) {
        self.state.write().unwrap().reflection_shape = shape;
        self.env_map.invalidate();
    }

    /// Rebuild the probe's map if stale, spending from the frame budget
    pub fn prepare_for_render(&self, budget: &mut u32) {
        self.env_map.prepare_for_render(budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{SpatialId, SpatialLink};

    #[test]
    fn test_matrix_moves_env_map() {
        let probe = REnvMapProbe::new(SpatialLink::new(SpatialId::new(1)), 128);
        let mut matrix = DMat4::identity();
        matrix[(0, 3)] = 3.0;
        matrix[(1, 3)] = 4.0;
        let area = DAabb::from_center_extents(DVec3::new(3.0, 4.0, 0.0), DVec3::new(5.0, 5.0, 5.0));
        probe.set_matrix(matrix, area);

        assert_eq!(probe.env_map().position(), DVec3::new(3.0, 4.0, 0.0));
        assert!(probe.env_map().is_dirty());
    }

    #[test]
    fn test_priority_propagates_to_env_map() {
        let probe = REnvMapProbe::new(SpatialLink::new(SpatialId::new(2)), 64);
        probe.set_influence(0.5, 7);
        assert_eq!(probe.env_map().influence_priority(), 7);
    }
}
