//! Render-side light

use std::sync::{Arc, RwLock};

use crate::foundation::math::{Color, DQuat, DVec3};
use crate::render::plan::RenderPlan;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

/// Light source type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Omnidirectional point light
    Point,
    /// Cone-limited spot light
    Spot,
    /// Planar projector light
    Projector,
}

/// State behind the light's lock
#[derive(Debug)]
struct RLightState {
    light_type: LightType,
    position: DVec3,
    orientation: DQuat,
    color: Color,
    intensity: f32,
    range: f64,
    spot_angle: f32,
    cast_shadows: bool,
    active: bool,
    layer_mask: LayerMask,

    /// World-space influence bounds derived from position and range
    bounds: DAabb,

    /// Light volume and shadow parameters need recomputation
    dirty_volume: bool,

    /// Resolved volume data staged for the renderer
    volume_radius: f64,
}

/// Reference-counted render-side light
#[derive(Debug)]
pub struct RLight {
    link: WorldLink,
    spatial: SpatialLink,
    prepare_queued: std::sync::atomic::AtomicBool,
    state: RwLock<RLightState>,
}

impl RLight {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            prepare_queued: std::sync::atomic::AtomicBool::new(false),
            state: RwLock::new(RLightState {
                light_type: LightType::Point,
                position: DVec3::zeros(),
                orientation: DQuat::identity(),
                color: Color::new(1.0, 1.0, 1.0, 1.0),
                intensity: 1.0,
                range: 10.0,
                spot_angle: 30.0,
                cast_shadows: true,
                active: true,
                layer_mask: LayerMask::default(),
                bounds: DAabb::from_center_extents(DVec3::zeros(), DVec3::new(10.0, 10.0, 10.0)),
                dirty_volume: true,
                volume_radius: 10.0,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    pub(crate) fn spatial_link(&self) -> &SpatialLink {
        &self.spatial
    }

    pub(crate) fn prepare_queued(&self) -> &std::sync::atomic::AtomicBool {
        &self.prepare_queued
    }

    /// World this light is linked into, if any
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

    /// World-space influence bounds
    pub fn bounds(&self) -> DAabb {
        self.state.read().unwrap().bounds
    }

    /// Source type
    pub fn light_type(&self) -> LightType {
        self.state.read().unwrap().light_type
    }

    /// Light color
    pub fn color(&self) -> Color {
        self.state.read().unwrap().color
    }

    /// Luminous intensity
    pub fn intensity(&self) -> f32 {
        self.state.read().unwrap().intensity
    }

    /// True if the light participates in rendering
    pub fn active(&self) -> bool {
        self.state.read().unwrap().active
    }

    /// Layers the light illuminates
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// Radius of the resolved light volume
    pub fn volume_radius(&self) -> f64 {
        self.state.read().unwrap().volume_radius
    }

    pub(crate) fn set_parameters(
        &self,
        light_type: LightType,
        color: Color,
        intensity: f32,
        range: f64,
        spot_angle: f32,
        cast_shadows: bool,
        active: bool,
    ) {
        let mut state = self.state.write().unwrap();
        state.light_type = light_type;
        state.color = color;
        state.intensity = intensity;
        state.range = range;
        state.spot_angle = spot_angle;
        state.cast_shadows = cast_shadows;
        state.active = active;
        state.dirty_volume = true;
    }

    pub(crate) fn set_geometry(&self, position: DVec3, orientation: DQuat) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.position = position;
        state.orientation = orientation;
        let extent = state.range.max(0.0);
        state.bounds =
            DAabb::from_center_extents(position, DVec3::new(extent, extent, extent));
        state.dirty_volume = true;
        state.bounds
    }

    pub(crate) fn set_layer_mask(&self, mask: LayerMask) {
        self.state.write().unwrap().layer_mask = mask;
    }

    /// Whether a spot cone limits the volume
    pub fn cast_shadows(&self) -> bool {
        self.state.read().unwrap().cast_shadows
    }

    /// Spot cone angle in degrees
    pub fn spot_angle(&self) -> f32 {
        self.state.read().unwrap().spot_angle
    }

    /// Influence range in meters
    pub fn range(&self) -> f64 {
        self.state.read().unwrap().range
    }

    /// Recompute the light volume before the main prepare pass
    ///
    /// Runs in the early pass because shadow layout decisions read the
    /// volume while the main pass is still draining object queues.
    pub fn early_prepare_for_render(&self) {
        let mut state = self.state.write().unwrap();
        if !state.dirty_volume {
            return;
        }

        // spot and projector volumes shrink to the cone footprint
        state.volume_radius = match state.light_type {
            LightType::Point => state.range,
            LightType::Spot | LightType::Projector => {
                let half_angle = f64::from(state.spot_angle).to_radians() * 0.5;
                state.range * half_angle.sin().max(0.25)
            }
        };
        state.dirty_volume = false;
    }

    /// Finish render preparation
    ///
    /// Returns true if the light wants another prepare pass next frame.
    pub fn prepare_for_render(&self, _plan: &RenderPlan) -> bool {
        // volume may have been invalidated by a sync between early and main
        // pass of a masked render; recompute and come back next frame
        let dirty = self.state.read().unwrap().dirty_volume;
        if dirty {
            self.early_prepare_for_render();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{SpatialId, SpatialLink};

    fn test_light() -> RLight {
        RLight::new(SpatialLink::new(SpatialId::new(1)))
    }

    #[test]
    fn test_geometry_updates_bounds() {
        let light = test_light();
        let bounds = light.set_geometry(DVec3::new(5.0, 0.0, 0.0), DQuat::identity());
        assert_eq!(bounds.center(), DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(bounds.extents(), DVec3::new(10.0, 10.0, 10.0));
    }

    #[test]
    fn test_early_prepare_resolves_volume() {
        let light = test_light();
        light.set_parameters(
            LightType::Point,
            Color::new(1.0, 1.0, 1.0, 1.0),
            10.0,
            25.0,
            30.0,
            false,
            true,
        );
        light.early_prepare_for_render();
        assert!((light.volume_radius() - 25.0).abs() < f64::EPSILON);
    }
}
