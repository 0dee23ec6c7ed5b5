//! Camera resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{view_matrix, DMat4, DQuat, DVec3};
use crate::render::camera::RCamera;
use crate::render::world::RWorld;
use crate::scene::LayerMask;

bitflags! {
    /// Aspects of a camera that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CameraDirty: u32 {
        const PARAMETERS = 1 << 0;
        const ADAPTION   = 1 << 1;
        const GEOMETRY   = 1 << 2;
        /// Derived from geometry, never set directly
        const MATRICES   = 1 << 3;
        const LAYER_MASK = 1 << 4;
        /// Parent world attachment
        const ATTACHMENT = 1 << 5;
    }
}

/// Mutable camera state owned by the logic thread
#[derive(Debug, Clone)]
struct CameraData {
    position: DVec3,
    orientation: DQuat,
    fov: f32,
    fov_ratio: f32,
    image_distance: f32,
    view_distance: f32,
    exposure: f32,
    lowest_intensity: f32,
    highest_intensity: f32,
    adaption_time: f32,
    layer_mask: LayerMask,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: DQuat::identity(),
            fov: 90.0,
            fov_ratio: 1.0,
            image_distance: 0.01,
            view_distance: 200.0,
            exposure: 1.0,
            lowest_intensity: 1.0,
            highest_intensity: 20.0,
            adaption_time: 0.1,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side camera
#[derive(Debug)]
pub struct Camera {
    data: CameraData,
    peer: CameraPeer,
}

impl Camera {
    /// Create a camera with engine default parameters
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: CameraData::default(),
            peer: CameraPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the camera
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Orientation
    pub fn orientation(&self) -> DQuat {
        self.data.orientation
    }

    /// Rotate the camera
    pub fn set_orientation(&mut self, orientation: DQuat) {
        self.data.orientation = orientation;
        self.peer.notify_geometry_changed();
    }

    /// Vertical field of view in degrees
    pub fn fov(&self) -> f32 {
        self.data.fov
    }

    /// Set the projection parameters
    pub fn set_projection(
        &mut self,
        fov: f32,
        fov_ratio: f32,
        image_distance: f32,
        view_distance: f32,
    ) {
        self.data.fov = fov;
        self.data.fov_ratio = fov_ratio;
        self.data.image_distance = image_distance;
        self.data.view_distance = view_distance;
        self.peer.notify_parameters_changed();
    }

    /// Exposure multiplier
    pub fn exposure(&self) -> f32 {
        self.data.exposure
    }

    /// Set the tone-mapping adaption parameters
    pub fn set_adaption(
        &mut self,
        exposure: f32,
        lowest_intensity: f32,
        highest_intensity: f32,
        adaption_time: f32,
    ) {
        self.data.exposure = exposure;
        self.data.lowest_intensity = lowest_intensity;
        self.data.highest_intensity = highest_intensity;
        self.data.adaption_time = adaption_time;
        self.peer.notify_adaption_changed();
    }

    /// Snap the tone mapper to the scene instead of easing (scene cut)
    pub fn reset_adaption(&mut self) {
        self.peer.notify_adaption_reset();
    }

    /// Layers this camera renders
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// View matrix for the current logic-side state
    ///
    /// Computed on demand; the render mirror carries its own copy pushed at
    /// sync time.
    pub fn view_matrix(&self) -> DMat4 {
        view_matrix(self.data.position, self.data.orientation)
    }

    /// The render mirror of this camera
    pub fn render_camera(&self) -> &Arc<RCamera> {
        self.peer.r_camera()
    }

    /// Accumulate frame time for tone-map adaption
    pub fn update(&mut self, elapsed: f32) {
        self.peer.accum_update += elapsed;
    }

    pub(crate) fn peer_mut(&mut self) -> &mut CameraPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &CameraPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a camera
#[derive(Debug)]
pub(crate) struct CameraPeer {
    ctx: RenderContext,
    r_camera: Arc<RCamera>,
    parent_world: Option<Arc<RWorld>>,
    dirty: CameraDirty,
    force_adaption: bool,
    accum_update: f32,
}

impl CameraPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_camera: Arc::new(RCamera::new()),
            parent_world: None,
            dirty: CameraDirty::all(),
            force_adaption: true,
            accum_update: 0.0,
        }
    }

    pub(crate) fn r_camera(&self) -> &Arc<RCamera> {
        &self.r_camera
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        self.parent_world = world;
        self.dirty.insert(CameraDirty::ATTACHMENT);
        self.force_adaption = true;
    }

    fn notify_parameters_changed(&mut self) {
        self.dirty.insert(CameraDirty::PARAMETERS);
    }

    fn notify_adaption_changed(&mut self) {
        self.dirty.insert(CameraDirty::ADAPTION);
    }

    fn notify_adaption_reset(&mut self) {
        self.force_adaption = true;
        self.dirty.insert(CameraDirty::ADAPTION);
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(CameraDirty::GEOMETRY);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(CameraDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &CameraData) {
        if self.dirty.contains(CameraDirty::ATTACHMENT) {
            self.r_camera.set_parent_world(self.parent_world.as_ref());
            self.dirty.remove(CameraDirty::ATTACHMENT);
        }

        if self.dirty.contains(CameraDirty::PARAMETERS) {
            self.r_camera.set_projection(
                data.fov,
                data.fov_ratio,
                data.image_distance,
                data.view_distance,
            );
            self.dirty.remove(CameraDirty::PARAMETERS);
        }

        if self.dirty.contains(CameraDirty::ADAPTION) {
            self.r_camera.set_adaption(
                data.exposure,
                data.lowest_intensity,
                data.highest_intensity,
                data.adaption_time,
            );
            if self.force_adaption {
                self.r_camera.force_adaption();
                self.force_adaption = false;
            }
            self.dirty.remove(CameraDirty::ADAPTION);
        }

        if self.dirty.contains(CameraDirty::GEOMETRY) {
            self.r_camera.set_geometry(data.position, data.orientation);
            self.dirty.remove(CameraDirty::GEOMETRY);
            // matrices derive from geometry
            self.dirty.insert(CameraDirty::MATRICES);
        }

        if self.dirty.contains(CameraDirty::MATRICES) {
            self.r_camera.update_matrices();
            self.dirty.remove(CameraDirty::MATRICES);
        }

        if self.dirty.contains(CameraDirty::LAYER_MASK) {
            self.r_camera.set_layer_mask(data.layer_mask);
            self.dirty.remove(CameraDirty::LAYER_MASK);
        }

        if self.accum_update > 0.0 {
            self.r_camera.add_pending_adaption(self.accum_update);
            self.accum_update = 0.0;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }
}

impl Drop for CameraPeer {
    fn drop(&mut self) {
        if self.parent_world.is_some() {
            // severing the world link walks the world graph; defer it and
            // the final reference drop to the frame boundary
            self.ctx
                .delayed_operations()
                .add_clean_up_camera(self.r_camera.clone());
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_camera.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_last_write_wins_within_frame() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut camera = Camera::new(&ctx).unwrap();
        camera.set_position(DVec3::new(0.0, 0.0, 0.0));
        camera.set_position(DVec3::new(5.0, 0.0, 0.0));
        camera.sync_to_render();

        assert_eq!(
            camera.render_camera().position(),
            DVec3::new(5.0, 0.0, 0.0)
        );
        assert!(camera.peer().is_clean());
    }

    #[test]
    fn test_geometry_cascades_into_matrices() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut camera = Camera::new(&ctx).unwrap();
        camera.sync_to_render();
        assert!(camera.peer().is_clean());

        camera.set_position(DVec3::new(0.0, 3.0, 0.0));
        assert!(camera.peer().dirty.contains(CameraDirty::GEOMETRY));
        assert!(!camera.peer().dirty.contains(CameraDirty::MATRICES));

        camera.sync_to_render();
        assert!(camera.peer().is_clean());

        // the mirror's matrices must reflect the move
        let view = camera.render_camera().view_matrix();
        let expected = view_matrix(DVec3::new(0.0, 3.0, 0.0), DQuat::identity());
        assert_eq!(view, expected);
    }
}
