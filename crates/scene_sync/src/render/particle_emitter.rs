//! Render-side particle emitter instance

use std::sync::{Arc, RwLock};

use crate::foundation::math::DVec3;
use crate::render::env_map::REnvMap;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

/// State behind the emitter instance's lock
#[derive(Debug)]
struct RParticleEmitterInstanceState {
    position: DVec3,
    extends: DAabb,
    cast_count: u32,
    casting_enabled: bool,
    burst_time: f32,
    layer_mask: LayerMask,

    render_env_map: Option<Arc<REnvMap>>,
    dirty_render_env_map: bool,
}

/// Reference-counted render-side particle emitter instance
#[derive(Debug)]
pub struct RParticleEmitterInstance {
    link: WorldLink,
    spatial: SpatialLink,
    state: RwLock<RParticleEmitterInstanceState>,
}

impl RParticleEmitterInstance {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            state: RwLock::new(RParticleEmitterInstanceState {
                position: DVec3::zeros(),
                extends: DAabb::from_center_extents(DVec3::zeros(), DVec3::new(1.0, 1.0, 1.0)),
                cast_count: 0,
                casting_enabled: false,
                burst_time: 0.0,
                layer_mask: LayerMask::default(),
                render_env_map: None,
                dirty_render_env_map: true,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    pub(crate) fn spatial_link(&self) -> &SpatialLink {
        &self.spatial
    }

    /// World this emitter instance is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.state.read().unwrap().position
    }

    /// World-space bounds covering all live particles
    pub fn extends(&self) -> DAabb {
        self.state.read().unwrap().extends
    }

    /// Number of particles cast since the last sync
    pub fn cast_count(&self) -> u32 {
        self.state.read().unwrap().cast_count
    }

    /// True if the emitter is currently casting
    pub fn casting_enabled(&self) -> bool {
        self.state.read().unwrap().casting_enabled
    }

    /// Seconds into the current burst
    pub fn burst_time(&self) -> f32 {
        self.state.read().unwrap().burst_time
    }

    /// Layers the particles render into
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// Environment map currently lighting the particles
    pub fn render_env_map(&self) -> Option<Arc<REnvMap>> {
        self.state.read().unwrap().render_env_map.clone()
    }

    pub(crate) fn set_geometry(&self, position: DVec3, extends: DAabb) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.position = position;
        state.extends = extends;
        extends
    }

    pub(crate) fn set_casting(&self, cast_count: u32, enabled: bool, burst_time: f32) {
        let mut state = self.state.write().unwrap();
        state.cast_count = cast_count;
        state.casting_enabled = enabled;
        state.burst_time = burst_time;
    }

    pub(crate) fn set_layer_mask(&self, mask: LayerMask) {
        self.state.write().unwrap().layer_mask = mask;
    }

    pub(crate) fn invalidate_render_env_map(&self) {
        let mut state = self.state.write().unwrap();
        state.render_env_map = None;
        state.dirty_render_env_map = true;
    }

    pub(crate) fn invalidate_render_env_map_if(&self, env_map: &Arc<REnvMap>) {
        let mut state = self.state.write().unwrap();
        if state
            .render_env_map
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, env_map))
        {
            state.render_env_map = None;
            state.dirty_render_env_map = true;
        }
    }

    /// Re-resolve the environment map after a layout change
    pub(crate) fn update_render_env_map(&self, world: &Arc<RWorld>) {
        let needs_update = self.state.read().unwrap().dirty_render_env_map;
        if !needs_update {
            return;
        }

        let center = self.state.read().unwrap().extends.center();
        let resolved = world.find_best_env_map(center);
        let mut state = self.state.write().unwrap();
        state.dirty_render_env_map = resolved.is_none();
        state.render_env_map = resolved;
    }

    pub(crate) fn world_reference_point_changed(&self) {
        // particle positions are staged relative to the emitter, which is
        // re-derived from double precision each frame
    }
}
