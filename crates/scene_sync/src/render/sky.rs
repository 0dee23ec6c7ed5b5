//! Render-side sky instance

use std::sync::{Arc, RwLock};

use crate::foundation::math::Color;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::LayerMask;

/// One layer of a sky definition, already resolved for rendering
#[derive(Debug, Clone)]
pub struct RSkyLayer {
    /// Light color contributed by this layer
    pub color: Color,
    /// Light intensity contributed by this layer
    pub intensity: f32,
    /// Ambient fraction of the intensity
    pub ambient_intensity: f32,
    /// Index of the controller driving this layer, if any
    pub controller: Option<usize>,
}

/// State behind the sky instance's lock
#[derive(Debug)]
struct RSkyInstanceState {
    layers: Vec<RSkyLayer>,
    controller_values: Vec<f32>,
    order: i32,
    layer_mask: LayerMask,

    /// Resolved total sky light, rebuilt in the prepare pass
    total_light_intensity: f32,
    total_ambient_intensity: f32,
    total_light_color: Color,
    dirty_light: bool,
}

/// Reference-counted render-side sky instance
#[derive(Debug)]
pub struct RSkyInstance {
    link: WorldLink,
    state: RwLock<RSkyInstanceState>,
}

impl RSkyInstance {
    pub(crate) fn new() -> Self {
        Self {
            link: WorldLink::new(),
            state: RwLock::new(RSkyInstanceState {
                layers: Vec::new(),
                controller_values: Vec::new(),
                order: 0,
                layer_mask: LayerMask::default(),
                total_light_intensity: 0.0,
                total_ambient_intensity: 0.0,
                total_light_color: Color::new(0.0, 0.0, 0.0, 1.0),
                dirty_light: true,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    /// World this sky is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// Draw order; lower orders render first
    pub fn order(&self) -> i32 {
        self.state.read().unwrap().order
    }

    /// Layers this sky applies to
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// Total light intensity resolved at the last prepare
    pub fn total_light_intensity(&self) -> f32 {
        self.state.read().unwrap().total_light_intensity
    }

    /// Ambient share of the total intensity resolved at the last prepare
    pub fn total_ambient_intensity(&self) -> f32 {
        self.state.read().unwrap().total_ambient_intensity
    }

    /// Total light color resolved at the last prepare
    pub fn total_light_color(&self) -> Color {
        self.state.read().unwrap().total_light_color
    }

    pub(crate) fn set_layers(&self, layers: Vec<RSkyLayer>) {
        let mut state = self.state.write().unwrap();
        state.layers = layers;
        state.dirty_light = true;
    }

    pub(crate) fn set_controller_values(&self, values: &[f32]) {
        let mut state = self.state.write().unwrap();
        state.controller_values.clear();
        state.controller_values.extend_from_slice(values);
        state.dirty_light = true;
    }

    pub(crate) fn set_order(&self, order: i32) {
        self.state.write().unwrap().order = order;
    }

    pub(crate) fn set_layer_mask(&self, mask: LayerMask) {
        self.state.write().unwrap().layer_mask = mask;
    }

    /// Resolve the total sky light from layers and controller values
    pub fn prepare_for_render(&self) {
        let mut state = self.state.write().unwrap();
        if !state.dirty_light {
            return;
        }

        let mut intensity = 0.0f32;
        let mut ambient = 0.0f32;
        let mut color = Color::new(0.0, 0.0, 0.0, 1.0);
        for layer in &state.layers {
            let factor = layer
                .controller
                .and_then(|index| state.controller_values.get(index).copied())
                .unwrap_or(1.0);
            let layer_intensity = layer.intensity * factor;
            intensity += layer_intensity;
            ambient += layer.ambient_intensity * factor;
            color.x += layer.color.x * layer_intensity;
            color.y += layer.color.y * layer_intensity;
            color.z += layer.color.z * layer_intensity;
        }

        if intensity > 0.0 {
            color /= intensity;
            color.w = 1.0;
        }

        state.total_light_intensity = intensity;
        state.total_ambient_intensity = ambient;
        state.total_light_color = color;
        state.dirty_light = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sky_light_resolution_uses_controllers() {
        let sky = RSkyInstance::new();
        sky.set_layers(vec![
            RSkyLayer {
                color: Color::new(1.0, 1.0, 1.0, 1.0),
                intensity: 10.0,
                ambient_intensity: 1.0,
                controller: Some(0),
            },
            RSkyLayer {
                color: Color::new(1.0, 0.0, 0.0, 1.0),
                intensity: 5.0,
                ambient_intensity: 0.0,
                controller: None,
            },
        ]);
        sky.set_controller_values(&[0.5]);
        sky.prepare_for_render();

        // 10 * 0.5 + 5 * 1.0
        assert!((sky.total_light_intensity() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_is_lazy() {
        let sky = RSkyInstance::new();
        sky.prepare_for_render();
        let first = sky.total_light_intensity();
        sky.prepare_for_render(); // second run hits the clean path
        assert!((sky.total_light_intensity() - first).abs() < f32::EPSILON);
    }
}
