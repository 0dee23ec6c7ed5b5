//! Render-side billboard

use std::sync::{Arc, RwLock};

use crate::foundation::math::DVec3;
use crate::render::env_map::REnvMap;
use crate::render::plan::RenderPlan;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

/// State behind the billboard's lock
#[derive(Debug)]
struct RBillboardState {
    position: DVec3,
    axis: DVec3,
    size: (f32, f32),
    offset: (f32, f32),
    locked: bool,
    spherical: bool,
    size_fixed_to_screen: bool,
    visible: bool,
    layer_mask: LayerMask,

    /// World-space bounds derived from position and size
    extends: DAabb,

    render_env_map: Option<Arc<REnvMap>>,
    dirty_render_env_map: bool,

    /// Camera-facing rotation staged for the renderer
    sort_distance: f32,
}

/// Reference-counted render-side billboard
#[derive(Debug)]
pub struct RBillboard {
    link: WorldLink,
    spatial: SpatialLink,
    prepare_queued: std::sync::atomic::AtomicBool,
    state: RwLock<RBillboardState>,
}

impl RBillboard {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            prepare_queued: std::sync::atomic::AtomicBool::new(false),
            state: RwLock::new(RBillboardState {
                position: DVec3::zeros(),
                axis: DVec3::new(0.0, 1.0, 0.0),
                size: (1.0, 1.0),
                offset: (0.0, 0.0),
                locked: false,
                spherical: true,
                size_fixed_to_screen: false,
                visible: true,
                layer_mask: LayerMask::default(),
                extends: DAabb::from_center_extents(DVec3::zeros(), DVec3::new(0.5, 0.5, 0.5)),
                render_env_map: None,
                dirty_render_env_map: true,
                sort_distance: 0.0,
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

    /// World this billboard is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// True if the billboard participates in rendering
    pub fn visible(&self) -> bool {
        self.state.read().unwrap().visible
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.state.read().unwrap().position
    }

    /// World-space bounds
    pub fn extends(&self) -> DAabb {
        self.state.read().unwrap().extends
    }

    /// Rotation axis for locked billboards
    pub fn axis(&self) -> DVec3 {
        self.state.read().unwrap().axis
    }

    /// Width and height in meters
    pub fn size(&self) -> (f32, f32) {
        self.state.read().unwrap().size
    }

    /// Offset of the image relative to the position
    pub fn offset(&self) -> (f32, f32) {
        self.state.read().unwrap().offset
    }

    /// True if the billboard only rotates around its axis
    pub fn locked(&self) -> bool {
        self.state.read().unwrap().locked
    }

    /// True if the billboard always faces the camera
    pub fn spherical(&self) -> bool {
        self.state.read().unwrap().spherical
    }

    /// True if the on-screen size ignores perspective
    pub fn size_fixed_to_screen(&self) -> bool {
        self.state.read().unwrap().size_fixed_to_screen
    }

    /// Layers the billboard renders into
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// Environment map currently lighting this billboard
    pub fn render_env_map(&self) -> Option<Arc<REnvMap>> {
        self.state.read().unwrap().render_env_map.clone()
    }

    /// View distance staged for transparency sorting
    pub fn sort_distance(&self) -> f32 {
        self.state.read().unwrap().sort_distance
    }

    pub(crate) fn set_parameters(
        &self,
        axis: DVec3,
        size: (f32, f32),
        offset: (f32, f32),
        locked: bool,
        spherical: bool,
        size_fixed_to_screen: bool,
        visible: bool,
    ) {
        let mut state = self.state.write().unwrap();
        state.axis = axis;
        state.size = size;
        state.offset = offset;
        state.locked = locked;
        state.spherical = spherical;
        state.size_fixed_to_screen = size_fixed_to_screen;
        state.visible = visible;
    }

    pub(crate) fn set_geometry(&self, position: DVec3) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.position = position;
        let half_w = f64::from(state.size.0) * 0.5;
        let half_h = f64::from(state.size.1) * 0.5;
        let radius = half_w.hypot(half_h);
        state.extends =
            DAabb::from_center_extents(position, DVec3::new(radius, radius, radius));
        state.extends
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
    ///
    /// Picks the map closest to the bounds center, falling back to the
    /// world's sky map. Called from the world's prepare pass when the
    /// env-map layout was invalidated.
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

    /// Resolve cross-references; render thread only
    ///
    /// Returns true if the billboard wants another prepare pass.
    pub fn prepare_for_render(&self, world: &Arc<RWorld>, _plan: &RenderPlan) -> bool {
        let needs_env_map = self.state.read().unwrap().dirty_render_env_map;
        if needs_env_map {
            self.update_render_env_map(world);
            return self.state.read().unwrap().dirty_render_env_map;
        }
        false
    }

    /// Stage renderer-facing data; runs after every prepare queue drained
    pub fn prepare_for_render_render(&self, _world: &Arc<RWorld>, plan: &RenderPlan) {
        let mut state = self.state.write().unwrap();
        let distance = (state.position - plan.camera_position).norm();
        state.sort_distance = distance as f32;
    }

    pub(crate) fn world_reference_point_changed(&self) {
        // billboard render data is rebuilt from double precision every
        // frame; nothing cached depends on the reference position yet
    }
}
