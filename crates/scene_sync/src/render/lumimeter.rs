//! Render-side lumimeter (light sensor)

use std::sync::{Arc, RwLock};

use crate::foundation::math::{Color, DVec3};
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::LayerMask;
use crate::spatial::SpatialLink;

/// State behind the lumimeter's lock
#[derive(Debug)]
struct RLumimeterState {
    position: DVec3,
    direction: DVec3,
    cone_inner_angle: f32,
    cone_outer_angle: f32,
    measure_radius: f64,
    layer_mask: LayerMask,

    /// Luminance measured at the last prepare
    luminance: f32,
    /// Color measured at the last prepare
    color: Color,
}

/// Reference-counted render-side lumimeter
///
/// Measurement happens on the render thread: it reads other render objects
/// (the world's lights), which the logic thread must never dereference.
#[derive(Debug)]
pub struct RLumimeter {
    link: WorldLink,
    spatial: SpatialLink,
    state: RwLock<RLumimeterState>,
}

impl RLumimeter {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            state: RwLock::new(RLumimeterState {
                position: DVec3::zeros(),
                direction: DVec3::new(0.0, 0.0, 1.0),
                cone_inner_angle: 45.0,
                cone_outer_angle: 90.0,
                measure_radius: 100.0,
                layer_mask: LayerMask::default(),
                luminance: 0.0,
                color: Color::new(0.0, 0.0, 0.0, 1.0),
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    pub(crate) fn spatial_link(&self) -> &SpatialLink {
        &self.spatial
    }

    /// World this lumimeter is linked into, if any
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

    /// Measurement direction
    pub fn direction(&self) -> DVec3 {
        self.state.read().unwrap().direction
    }

    /// Inner and outer cone angles in degrees
    pub fn cone_angles(&self) -> (f32, f32) {
        let state = self.state.read().unwrap();
        (state.cone_inner_angle, state.cone_outer_angle)
    }

    /// Luminance measured at the last prepare
    pub fn luminance(&self) -> f32 {
        self.state.read().unwrap().luminance
    }

    /// Light color measured at the last prepare
    pub fn measured_color(&self) -> Color {
        self.state.read().unwrap().color
    }

    /// Radius within which lights are sampled
    pub fn measure_radius(&self) -> f64 {
        self.state.read().unwrap().measure_radius
    }

    pub(crate) fn set_geometry(&self, position: DVec3, direction: DVec3) {
        let mut state = self.state.write().unwrap();
        state.position = position;
        state.direction = direction;
    }

    pub(crate) fn set_parameters(
        &self,
        cone_inner_angle: f32,
        cone_outer_angle: f32,
        measure_radius: f64,
        layer_mask: LayerMask,
    ) {
        let mut state = self.state.write().unwrap();
        state.cone_inner_angle = cone_inner_angle;
        state.cone_outer_angle = cone_outer_angle;
        state.measure_radius = measure_radius;
        state.layer_mask = layer_mask;
    }

    /// Sample the lights around the sensor; render thread only
    ///
    /// Uses the world's spatial index to restrict the sample set, then sums
    /// inverse-square attenuated intensities of matching active lights.
    pub fn prepare_for_render(&self, world: &Arc<RWorld>) {
        let (position, radius, mask) = {
            let state = self.state.read().unwrap();
            (state.position, state.measure_radius, state.layer_mask)
        };

        let mut luminance = 0.0f32;
        let mut color = Color::new(0.0, 0.0, 0.0, 1.0);

        for light in world.lights_in_range(position, radius) {
            if !light.active() || !light.layer_mask().matches(mask) {
                continue;
            }

            let distance_sq = (light.position() - position).norm_squared();
            let attenuation = 1.0 / distance_sq.max(1.0);
            let contribution = light.intensity() * attenuation as f32;

            let light_color = light.color();
            luminance += contribution;
            color.x += light_color.x * contribution;
            color.y += light_color.y * contribution;
            color.z += light_color.z * contribution;
        }

        if luminance > 0.0 {
            color /= luminance;
            color.w = 1.0;
        }

        let mut state = self.state.write().unwrap();
        state.luminance = luminance;
        state.color = color;
    }
}
