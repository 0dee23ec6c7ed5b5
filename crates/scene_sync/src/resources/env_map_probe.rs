//! Environment map probe resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{world_matrix, DQuat, DVec3};
use crate::render::env_map_probe::REnvMapProbe;
use crate::render::world::RWorld;
use crate::scene::DAabb;
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a probe that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct EnvMapProbeDirty: u32 {
        const MATRIX           = 1 << 0;
        const INFLUENCE        = 1 << 1;
        const REFLECTION_SHAPE = 1 << 2;
        /// Derived from the matrix, never set directly
        const OCTREE           = 1 << 3;
    }
}

/// Mutable probe state owned by the logic thread
#[derive(Debug, Clone)]
struct EnvMapProbeData {
    position: DVec3,
    orientation: DQuat,
    scaling: DVec3,
    influence_extents: DVec3,
    influence_border: f32,
    influence_priority: i32,
    reflection_shape: Option<DAabb>,
}

impl Default for EnvMapProbeData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: DQuat::identity(),
            scaling: DVec3::new(1.0, 1.0, 1.0),
            influence_extents: DVec3::new(5.0, 5.0, 5.0),
            influence_border: 0.1,
            influence_priority: 0,
            reflection_shape: None,
        }
    }
}

/// Logic-side environment map probe
#[derive(Debug)]
pub struct EnvMapProbe {
    data: EnvMapProbeData,
    peer: EnvMapProbePeer,
}

impl EnvMapProbe {
    /// Create a probe with engine default parameters
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: EnvMapProbeData::default(),
            peer: EnvMapProbePeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the probe
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_matrix_changed();
    }

    /// Orientation
    pub fn orientation(&self) -> DQuat {
        self.data.orientation
    }

    /// Rotate the probe
    pub fn set_orientation(&mut self, orientation: DQuat) {
        self.data.orientation = orientation;
        self.peer.notify_matrix_changed();
    }

    /// Half-size of the influence volume
    pub fn influence_extents(&self) -> DVec3 {
        self.data.influence_extents
    }

    /// Resize the influence volume
    pub fn set_influence_extents(&mut self, extents: DVec3) {
        self.data.influence_extents = extents;
        self.peer.notify_matrix_changed();
    }

    /// Fade border width around the influence volume
    pub fn influence_border(&self) -> f32 {
        self.data.influence_border
    }

    /// Probes with higher priority win in overlapping regions
    pub fn influence_priority(&self) -> i32 {
        self.data.influence_priority
    }

    /// Set fade border and priority
    pub fn set_influence(&mut self, border: f32, priority: i32) {
        self.data.influence_border = border;
        self.data.influence_priority = priority;
        self.peer.notify_influence_changed();
    }

    /// Optional box reflection shape
    pub fn reflection_shape(&self) -> Option<DAabb> {
        self.data.reflection_shape
    }

    /// Replace the reflection shape
    pub fn set_reflection_shape(&mut self, shape: Option<DAabb>) {
        self.data.reflection_shape = shape;
        self.peer.notify_reflection_shape_changed();
    }

    /// The render mirror of this probe
    pub fn render_probe(&self) -> &Arc<REnvMapProbe> {
        self.peer.r_probe()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut EnvMapProbePeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &EnvMapProbePeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of an environment map probe
#[derive(Debug)]
pub(crate) struct EnvMapProbePeer {
    ctx: RenderContext,
    r_probe: Arc<REnvMapProbe>,
    parent_world: Option<Arc<RWorld>>,
    dirty: EnvMapProbeDirty,
}

impl EnvMapProbePeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_probe: Arc::new(REnvMapProbe::new(
                SpatialLink::new(ctx.next_spatial_id()),
                ctx.config().env_map_size,
            )),
            parent_world: None,
            dirty: EnvMapProbeDirty::all(),
        }
    }

    pub(crate) fn r_probe(&self) -> &Arc<REnvMapProbe> {
        &self.r_probe
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_probe.world_link().has_parent() {
            self.r_probe.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(EnvMapProbeDirty::OCTREE);
    }

    fn notify_matrix_changed(&mut self) {
        self.dirty.insert(EnvMapProbeDirty::MATRIX);
    }

    fn notify_influence_changed(&mut self) {
        self.dirty.insert(EnvMapProbeDirty::INFLUENCE);
    }

    fn notify_reflection_shape_changed(&mut self) {
        self.dirty.insert(EnvMapProbeDirty::REFLECTION_SHAPE);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &EnvMapProbeData) {
        if self.dirty.contains(EnvMapProbeDirty::MATRIX) {
            let matrix = world_matrix(data.position, data.orientation, data.scaling);
            let influence = DAabb::from_center_extents(data.position, data.influence_extents);
            self.r_probe.set_matrix(matrix, influence);
            self.dirty.remove(EnvMapProbeDirty::MATRIX);
            self.dirty.insert(EnvMapProbeDirty::OCTREE);
        }

        if self.dirty.contains(EnvMapProbeDirty::INFLUENCE) {
            self.r_probe
                .set_influence(data.influence_border, data.influence_priority);
            self.dirty.remove(EnvMapProbeDirty::INFLUENCE);
        }

        if self.dirty.contains(EnvMapProbeDirty::REFLECTION_SHAPE) {
            self.r_probe.set_reflection_shape(data.reflection_shape);
            self.dirty.remove(EnvMapProbeDirty::REFLECTION_SHAPE);
        }

        if self.dirty.contains(EnvMapProbeDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_probe.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_probe.spatial_link(),
                        self.r_probe.influence_area(),
                    );
                }
            }
            self.dirty.remove(EnvMapProbeDirty::OCTREE);
        }
    }
}

impl Drop for EnvMapProbePeer {
    fn drop(&mut self) {
        if self.r_probe.world_link().has_parent() {
            // the sweep for probes runs in the early prepare pass, where
            // destroying the probe's environment map is safe
            self.r_probe.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_probe.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
