//! Light resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{Color, DQuat, DVec3};
use crate::render::light::{LightType, RLight};
use crate::render::world::RWorld;
use crate::scene::LayerMask;
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a light that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct LightDirty: u32 {
        const PARAMETERS = 1 << 0;
        const GEOMETRY   = 1 << 1;
        /// Octree entry; derived from geometry, never set directly
        const OCTREE     = 1 << 2;
        const LAYER_MASK = 1 << 3;
    }
}

/// Mutable light state owned by the logic thread
#[derive(Debug, Clone)]
struct LightData {
    light_type: LightType,
    position: DVec3,
    orientation: DQuat,
    color: Color,
    intensity: f32,
    range: f64,
    spot_angle: f32,
    cast_shadows: bool,
    activated: bool,
    layer_mask: LayerMask,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            position: DVec3::zeros(),
            orientation: DQuat::identity(),
            color: Color::new(1.0, 1.0, 1.0, 1.0),
            intensity: 1.0,
            range: 10.0,
            spot_angle: 30.0,
            cast_shadows: true,
            activated: true,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side light source
///
/// Mutations only record intent in the peer's dirty flags; nothing crosses
/// to the render side until the owning world's sync pass runs.
#[derive(Debug)]
pub struct Light {
    data: LightData,
    peer: LightPeer,
}

impl Light {
    /// Create a light with engine default parameters
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: LightData::default(),
            peer: LightPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the light
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Orientation
    pub fn orientation(&self) -> DQuat {
        self.data.orientation
    }

    /// Rotate the light
    pub fn set_orientation(&mut self, orientation: DQuat) {
        self.data.orientation = orientation;
        self.peer.notify_geometry_changed();
    }

    /// Source type
    pub fn light_type(&self) -> LightType {
        self.data.light_type
    }

    /// Change the source type
    pub fn set_light_type(&mut self, light_type: LightType) {
        self.data.light_type = light_type;
        self.peer.notify_parameters_changed();
    }

    /// Light color
    pub fn color(&self) -> Color {
        self.data.color
    }

    /// Change the light color
    pub fn set_color(&mut self, color: Color) {
        self.data.color = color;
        self.peer.notify_parameters_changed();
    }

    /// Luminous intensity
    pub fn intensity(&self) -> f32 {
        self.data.intensity
    }

    /// Change the luminous intensity
    pub fn set_intensity(&mut self, intensity: f32) {
        self.data.intensity = intensity;
        self.peer.notify_parameters_changed();
    }

    /// Influence range in meters
    pub fn range(&self) -> f64 {
        self.data.range
    }

    /// Change the influence range; the influence bounds follow
    pub fn set_range(&mut self, range: f64) {
        self.data.range = range;
        self.peer.notify_parameters_changed();
        self.peer.notify_geometry_changed();
    }

    /// Spot cone angle in degrees
    pub fn spot_angle(&self) -> f32 {
        self.data.spot_angle
    }

    /// Change the spot cone angle
    pub fn set_spot_angle(&mut self, angle: f32) {
        self.data.spot_angle = angle;
        self.peer.notify_parameters_changed();
    }

    /// True if the light casts shadows
    pub fn cast_shadows(&self) -> bool {
        self.data.cast_shadows
    }

    /// Toggle shadow casting
    pub fn set_cast_shadows(&mut self, cast: bool) {
        self.data.cast_shadows = cast;
        self.peer.notify_parameters_changed();
    }

    /// True if the light participates in rendering
    pub fn activated(&self) -> bool {
        self.data.activated
    }

    /// Toggle the light
    pub fn set_activated(&mut self, activated: bool) {
        self.data.activated = activated;
        self.peer.notify_parameters_changed();
    }

    /// Layers the light illuminates
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// The render mirror of this light
    pub fn render_light(&self) -> &Arc<RLight> {
        self.peer.r_light()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut LightPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &LightPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a light, accumulating dirty flags
#[derive(Debug)]
pub(crate) struct LightPeer {
    ctx: RenderContext,
    r_light: Arc<RLight>,
    parent_world: Option<Arc<RWorld>>,
    dirty: LightDirty,
}

impl LightPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_light: Arc::new(RLight::new(SpatialLink::new(ctx.next_spatial_id()))),
            parent_world: None,
            dirty: LightDirty::all(), // schedule the first full sync
        }
    }

    pub(crate) fn r_light(&self) -> &Arc<RLight> {
        &self.r_light
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_light.world_link().has_parent() {
            self.r_light.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(LightDirty::OCTREE);
    }

    fn notify_parameters_changed(&mut self) {
        self.dirty.insert(LightDirty::PARAMETERS);
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(LightDirty::GEOMETRY);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(LightDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &LightData) {
        if self.dirty.contains(LightDirty::PARAMETERS) {
            self.r_light.set_parameters(
                data.light_type,
                data.color,
                data.intensity,
                data.range,
                data.spot_angle,
                data.cast_shadows,
                data.activated,
            );
            self.dirty.remove(LightDirty::PARAMETERS);
        }

        if self.dirty.contains(LightDirty::GEOMETRY) {
            self.r_light.set_geometry(data.position, data.orientation);
            self.dirty.remove(LightDirty::GEOMETRY);
            // moving the light moves its octree entry
            self.dirty.insert(LightDirty::OCTREE);
        }

        if self.dirty.contains(LightDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_light.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_light.spatial_link(),
                        self.r_light.bounds(),
                    );
                }
            }
            self.dirty.remove(LightDirty::OCTREE);
        }

        if self.dirty.contains(LightDirty::LAYER_MASK) {
            self.r_light.set_layer_mask(data.layer_mask);
            self.dirty.remove(LightDirty::LAYER_MASK);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }
}

impl Drop for LightPeer {
    fn drop(&mut self) {
        if self.r_light.world_link().has_parent() {
            // the world still holds a reference; flag for the sweep and
            // park ours until the frame boundary
            self.r_light.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_light.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_notifications_are_idempotent() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut light = Light::new(&ctx).unwrap();
        light.sync_to_render();
        assert!(light.peer().is_clean());

        light.set_intensity(5.0);
        let once = light.peer().dirty;
        light.set_intensity(7.0);
        assert_eq!(once, light.peer().dirty, "second notify changes nothing");
    }

    #[test]
    fn test_sync_applies_last_write() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut light = Light::new(&ctx).unwrap();
        light.set_position(DVec3::new(1.0, 0.0, 0.0));
        light.set_position(DVec3::new(5.0, 0.0, 0.0));
        light.sync_to_render();

        assert_eq!(light.render_light().position(), DVec3::new(5.0, 0.0, 0.0));
        assert!(light.peer().is_clean());
    }
}
