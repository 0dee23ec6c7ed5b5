//! Render-side camera

use std::sync::{Arc, RwLock};

use crate::foundation::math::{view_matrix, DMat4, DQuat, DVec3};
use crate::render::plan::RenderPlan;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::LayerMask;

/// State behind the camera's lock
#[derive(Debug)]
struct RCameraState {
    position: DVec3,
    orientation: DQuat,
    view_matrix: DMat4,
    inverse_view_matrix: DMat4,

    fov: f32,
    fov_ratio: f32,
    image_distance: f32,
    view_distance: f32,

    exposure: f32,
    lowest_intensity: f32,
    highest_intensity: f32,
    adaption_time: f32,

    layer_mask: LayerMask,

    /// Seconds of game time accumulated since the last prepare, applied to
    /// tone-map adaption on the render thread
    pending_adaption: f32,

    /// Jump adaption to the target instead of easing (scene cut)
    force_adaption: bool,

    /// Current adapted scene intensity
    adapted_intensity: f32,
}

/// Reference-counted render-side camera
///
/// Cameras are not stored in a world container; they reference the world
/// they render. Detaching walks the world graph, so on teardown the link is
/// severed through the delayed operations queue, never inline.
#[derive(Debug)]
pub struct RCamera {
    link: WorldLink,
    state: RwLock<RCameraState>,
}

impl RCamera {
    /// Create a camera with engine default parameters
    pub fn new() -> Self {
        Self {
            link: WorldLink::new(),
            state: RwLock::new(RCameraState {
                position: DVec3::zeros(),
                orientation: DQuat::identity(),
                view_matrix: DMat4::identity(),
                inverse_view_matrix: DMat4::identity(),
                fov: 90.0,
                fov_ratio: 1.0,
                image_distance: 0.01,
                view_distance: 200.0,
                exposure: 1.0,
                lowest_intensity: 1.0,
                highest_intensity: 20.0,
                adaption_time: 0.1,
                layer_mask: LayerMask::default(),
                pending_adaption: 0.0,
                force_adaption: true,
                adapted_intensity: 1.0,
            }),
        }
    }

    /// World this camera renders, if attached
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    pub(crate) fn set_parent_world(&self, world: Option<&Arc<RWorld>>) {
        self.link.set_parent(world);
        // a new world means a new lighting situation; snap the adaption
        self.state.write().unwrap().force_adaption = true;
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.state.read().unwrap().position
    }

    /// View matrix derived from position and orientation at the last sync
    pub fn view_matrix(&self) -> DMat4 {
        self.state.read().unwrap().view_matrix
    }

    /// Inverse of [`Self::view_matrix`] (camera-to-world)
    pub fn inverse_view_matrix(&self) -> DMat4 {
        self.state.read().unwrap().inverse_view_matrix
    }

    /// Vertical field of view in degrees
    pub fn fov(&self) -> f32 {
        self.state.read().unwrap().fov
    }

    /// Aspect ratio of the field of view
    pub fn fov_ratio(&self) -> f32 {
        self.state.read().unwrap().fov_ratio
    }

    /// Near plane distance
    pub fn image_distance(&self) -> f32 {
        self.state.read().unwrap().image_distance
    }

    /// Far plane distance
    pub fn view_distance(&self) -> f32 {
        self.state.read().unwrap().view_distance
    }

    /// Exposure multiplier
    pub fn exposure(&self) -> f32 {
        self.state.read().unwrap().exposure
    }

    /// Layers this camera renders
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// Intensity the tone mapper has currently adapted to
    pub fn adapted_intensity(&self) -> f32 {
        self.state.read().unwrap().adapted_intensity
    }

    pub(crate) fn set_geometry(&self, position: DVec3, orientation: DQuat) {
        let mut state = self.state.write().unwrap();
        state.position = position;
        state.orientation = orientation;
    }

    pub(crate) fn set_matrices(&self, view: DMat4, inverse_view: DMat4) {
        let mut state = self.state.write().unwrap();
        state.view_matrix = view;
        state.inverse_view_matrix = inverse_view;
    }

    pub(crate) fn set_projection(
        &self,
        fov: f32,
        fov_ratio: f32,
        image_distance: f32,
        view_distance: f32,
    ) {
        let mut state = self.state.write().unwrap();
        state.fov = fov;
        state.fov_ratio = fov_ratio;
        state.image_distance = image_distance;
        state.view_distance = view_distance;
    }

    pub(crate) fn set_adaption(
        &self,
        exposure: f32,
        lowest_intensity: f32,
        highest_intensity: f32,
        adaption_time: f32,
    ) {
        let mut state = self.state.write().unwrap();
        state.exposure = exposure;
        state.lowest_intensity = lowest_intensity;
        state.highest_intensity = highest_intensity;
        state.adaption_time = adaption_time;
    }

    pub(crate) fn set_layer_mask(&self, mask: LayerMask) {
        self.state.write().unwrap().layer_mask = mask;
    }

    pub(crate) fn add_pending_adaption(&self, elapsed: f32) {
        self.state.write().unwrap().pending_adaption += elapsed;
    }

    pub(crate) fn force_adaption(&self) {
        self.state.write().unwrap().force_adaption = true;
    }

    /// Advance tone-map adaption; render thread, once per prepared frame
    ///
    /// The target intensity comes from the world's current sky light; the
    /// adapted value eases toward it over `adaption_time`, clamped to the
    /// camera's intensity window.
    pub fn prepare_for_render(&self, _plan: &RenderPlan) {
        let world = self.link.parent_world();
        let target = world.as_ref().map_or(1.0, |w| w.sky_light_intensity());

        let mut state = self.state.write().unwrap();
        let target = target.clamp(state.lowest_intensity, state.highest_intensity);

        if state.force_adaption {
            state.adapted_intensity = target;
            state.force_adaption = false;
            state.pending_adaption = 0.0;
            return;
        }

        let elapsed = std::mem::replace(&mut state.pending_adaption, 0.0);
        if elapsed <= 0.0 || state.adaption_time <= 0.0 {
            return;
        }

        let factor = (elapsed / state.adaption_time).min(1.0);
        state.adapted_intensity += (target - state.adapted_intensity) * factor;
    }

    /// Recompute matrices from position and orientation
    pub(crate) fn update_matrices(&self) {
        let mut state = self.state.write().unwrap();
        let view = view_matrix(state.position, state.orientation);
        state.inverse_view_matrix = view.try_inverse().unwrap_or_else(DMat4::identity);
        state.view_matrix = view;
    }
}

impl Default for RCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::plan::RenderPlan;

    #[test]
    fn test_adaption_snaps_on_first_prepare() {
        let camera = RCamera::new();
        camera.add_pending_adaption(0.016);
        camera.prepare_for_render(&RenderPlan::default());
        // no world: target 1.0, snapped because force_adaption starts true
        assert!((camera.adapted_intensity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_adaption_eases_toward_target() {
        let camera = RCamera::new();
        camera.prepare_for_render(&RenderPlan::default()); // snap to 1.0

        // fake a brighter scene by raising the clamp floor
        camera.set_adaption(1.0, 5.0, 20.0, 1.0);
        camera.add_pending_adaption(0.5);
        camera.prepare_for_render(&RenderPlan::default());
        let adapted = camera.adapted_intensity();
        assert!(adapted > 1.0 && adapted < 5.0, "eases, does not snap: {adapted}");
    }
}
