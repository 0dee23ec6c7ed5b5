//! Lumimeter resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{Color, DVec3};
use crate::render::lumimeter::RLumimeter;
use crate::render::world::RWorld;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a lumimeter that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LumimeterDirty: u32 {
        const GEOMETRY   = 1 << 0;
        const PARAMETERS = 1 << 1;
        /// Derived from geometry, never set directly
        const OCTREE     = 1 << 2;
    }
}

/// Mutable lumimeter state owned by the logic thread
#[derive(Debug, Clone)]
struct LumimeterData {
    position: DVec3,
    direction: DVec3,
    cone_inner_angle: f32,
    cone_outer_angle: f32,
    measure_radius: f64,
    layer_mask: LayerMask,
}

impl Default for LumimeterData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            direction: DVec3::new(0.0, 0.0, 1.0),
            cone_inner_angle: 45.0,
            cone_outer_angle: 90.0,
            measure_radius: 100.0,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side light sensor
///
/// Measurement results flow the other way: the render thread measures
/// during its prepare pass, gameplay reads [`Self::measured_luminance`]
/// afterwards. A frame of latency is inherent to the design.
#[derive(Debug)]
pub struct Lumimeter {
    data: LumimeterData,
    peer: LumimeterPeer,
}

impl Lumimeter {
    /// Create a lumimeter with engine default parameters
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: LumimeterData::default(),
            peer: LumimeterPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the sensor
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Measurement direction
    pub fn direction(&self) -> DVec3 {
        self.data.direction
    }

    /// Change the measurement direction
    pub fn set_direction(&mut self, direction: DVec3) {
        self.data.direction = direction;
        self.peer.notify_geometry_changed();
    }

    /// Set cone angles and sampling radius
    pub fn set_measurement(&mut self, inner_angle: f32, outer_angle: f32, radius: f64) {
        self.data.cone_inner_angle = inner_angle;
        self.data.cone_outer_angle = outer_angle;
        self.data.measure_radius = radius;
        self.peer.notify_parameters_changed();
    }

    /// Layers the sensor samples
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_parameters_changed();
    }

    /// Luminance measured by the render thread at its last prepare
    pub fn measured_luminance(&self) -> f32 {
        self.peer.r_lumimeter().luminance()
    }

    /// Light color measured by the render thread at its last prepare
    pub fn measured_color(&self) -> Color {
        self.peer.r_lumimeter().measured_color()
    }

    /// The render mirror of this lumimeter
    pub fn render_lumimeter(&self) -> &Arc<RLumimeter> {
        self.peer.r_lumimeter()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut LumimeterPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &LumimeterPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a lumimeter
#[derive(Debug)]
pub(crate) struct LumimeterPeer {
    ctx: RenderContext,
    r_lumimeter: Arc<RLumimeter>,
    parent_world: Option<Arc<RWorld>>,
    dirty: LumimeterDirty,
}

impl LumimeterPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_lumimeter: Arc::new(RLumimeter::new(SpatialLink::new(ctx.next_spatial_id()))),
            parent_world: None,
            dirty: LumimeterDirty::all(),
        }
    }

    pub(crate) fn r_lumimeter(&self) -> &Arc<RLumimeter> {
        &self.r_lumimeter
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_lumimeter.world_link().has_parent() {
            self.r_lumimeter.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(LumimeterDirty::OCTREE);
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(LumimeterDirty::GEOMETRY);
    }

    fn notify_parameters_changed(&mut self) {
        self.dirty.insert(LumimeterDirty::PARAMETERS);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &LumimeterData) {
        if self.dirty.contains(LumimeterDirty::GEOMETRY) {
            self.r_lumimeter.set_geometry(data.position, data.direction);
            self.dirty.remove(LumimeterDirty::GEOMETRY);
            self.dirty.insert(LumimeterDirty::OCTREE);
        }

        if self.dirty.contains(LumimeterDirty::PARAMETERS) {
            self.r_lumimeter.set_parameters(
                data.cone_inner_angle,
                data.cone_outer_angle,
                data.measure_radius,
                data.layer_mask,
            );
            self.dirty.remove(LumimeterDirty::PARAMETERS);
        }

        if self.dirty.contains(LumimeterDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_lumimeter.world_link().is_parent(world) {
                    let bounds = DAabb::from_center_extents(
                        self.r_lumimeter.position(),
                        DVec3::new(0.1, 0.1, 0.1),
                    );
                    world.update_octree_entry(self.r_lumimeter.spatial_link(), bounds);
                }
            }
            self.dirty.remove(LumimeterDirty::OCTREE);
        }
    }
}

impl Drop for LumimeterPeer {
    fn drop(&mut self) {
        if self.r_lumimeter.world_link().has_parent() {
            self.r_lumimeter.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_lumimeter.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
