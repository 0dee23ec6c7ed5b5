//! Particle emitter instance resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::DVec3;
use crate::render::particle_emitter::RParticleEmitterInstance;
use crate::render::world::RWorld;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of an emitter instance that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ParticleEmitterDirty: u32 {
        const GEOMETRY   = 1 << 0;
        const CASTS      = 1 << 1;
        /// Derived from geometry, never set directly
        const OCTREE     = 1 << 2;
        const LAYER_MASK = 1 << 3;
    }
}

/// Mutable emitter state owned by the logic thread
#[derive(Debug, Clone)]
struct ParticleEmitterData {
    position: DVec3,
    particle_extents: DVec3,
    cast_count: u32,
    casting_enabled: bool,
    burst_time: f32,
    layer_mask: LayerMask,
}

impl Default for ParticleEmitterData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            particle_extents: DVec3::new(1.0, 1.0, 1.0),
            cast_count: 0,
            casting_enabled: false,
            burst_time: 0.0,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side particle emitter instance
///
/// Cast counts come from the particle simulation, which runs as gameplay;
/// the render side only ever sees the resulting counts and bounds.
#[derive(Debug)]
pub struct ParticleEmitterInstance {
    data: ParticleEmitterData,
    peer: ParticleEmitterInstancePeer,
}

impl ParticleEmitterInstance {
    /// Create an idle emitter instance
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: ParticleEmitterData::default(),
            peer: ParticleEmitterInstancePeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the emitter
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Half-size of the volume covering all live particles
    pub fn particle_extents(&self) -> DVec3 {
        self.data.particle_extents
    }

    /// Update the particle volume from the simulation
    pub fn set_particle_extents(&mut self, extents: DVec3) {
        self.data.particle_extents = extents;
        self.peer.notify_geometry_changed();
    }

    /// Number of particles cast
    pub fn cast_count(&self) -> u32 {
        self.data.cast_count
    }

    /// True if the emitter is casting
    pub fn casting_enabled(&self) -> bool {
        self.data.casting_enabled
    }

    /// Update casting state from the simulation
    pub fn set_casting(&mut self, cast_count: u32, enabled: bool, burst_time: f32) {
        self.data.cast_count = cast_count;
        self.data.casting_enabled = enabled;
        self.data.burst_time = burst_time;
        self.peer.notify_casts_changed();
    }

    /// Layers the particles render into
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// The render mirror of this emitter instance
    pub fn render_emitter(&self) -> &Arc<RParticleEmitterInstance> {
        self.peer.r_emitter()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut ParticleEmitterInstancePeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &ParticleEmitterInstancePeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a particle emitter instance
#[derive(Debug)]
pub(crate) struct ParticleEmitterInstancePeer {
    ctx: RenderContext,
    r_emitter: Arc<RParticleEmitterInstance>,
    parent_world: Option<Arc<RWorld>>,
    dirty: ParticleEmitterDirty,
}

impl ParticleEmitterInstancePeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_emitter: Arc::new(RParticleEmitterInstance::new(SpatialLink::new(
                ctx.next_spatial_id(),
            ))),
            parent_world: None,
            dirty: ParticleEmitterDirty::all(),
        }
    }

    pub(crate) fn r_emitter(&self) -> &Arc<RParticleEmitterInstance> {
        &self.r_emitter
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_emitter.world_link().has_parent() {
            self.r_emitter.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(ParticleEmitterDirty::OCTREE);
        self.r_emitter.invalidate_render_env_map();
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(ParticleEmitterDirty::GEOMETRY);
    }

    fn notify_casts_changed(&mut self) {
        self.dirty.insert(ParticleEmitterDirty::CASTS);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(ParticleEmitterDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &ParticleEmitterData) {
        if self.dirty.contains(ParticleEmitterDirty::GEOMETRY) {
            let extends =
                DAabb::from_center_extents(data.position, data.particle_extents);
            self.r_emitter.set_geometry(data.position, extends);
            self.dirty.remove(ParticleEmitterDirty::GEOMETRY);
            self.dirty.insert(ParticleEmitterDirty::OCTREE);
        }

        if self.dirty.contains(ParticleEmitterDirty::CASTS) {
            self.r_emitter.set_casting(
                data.cast_count,
                data.casting_enabled,
                data.burst_time,
            );
            self.dirty.remove(ParticleEmitterDirty::CASTS);
        }

        if self.dirty.contains(ParticleEmitterDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_emitter.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_emitter.spatial_link(),
                        self.r_emitter.extends(),
                    );
                }
            }
            self.dirty.remove(ParticleEmitterDirty::OCTREE);
        }

        if self.dirty.contains(ParticleEmitterDirty::LAYER_MASK) {
            self.r_emitter.set_layer_mask(data.layer_mask);
            self.dirty.remove(ParticleEmitterDirty::LAYER_MASK);
        }
    }
}

impl Drop for ParticleEmitterInstancePeer {
    fn drop(&mut self) {
        if self.r_emitter.world_link().has_parent() {
            self.r_emitter.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_emitter.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
