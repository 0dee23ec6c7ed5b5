//! Render-side component (mesh-bearing scene object)

use std::sync::{Arc, RwLock};

use crate::foundation::math::{DMat4, DVec3, Mat4};
use crate::render::env_map::REnvMap;
use crate::render::plan::RenderPlan;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

/// How often a component is expected to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementHint {
    /// Never moves after insertion
    Stationary,
    /// Moves rarely or within a small region
    Jittering,
    /// Moves freely
    Dynamic,
}

/// State behind the component's lock
#[derive(Debug)]
struct RComponentState {
    visible: bool,
    movement_hint: MovementHint,
    layer_mask: LayerMask,

    /// World matrix from the last sync
    matrix: DMat4,

    /// Model-space bounds
    local_extends: DAabb,

    /// World-space bounds derived from matrix and local extends
    extends: DAabb,

    lod_count: u32,
    lod_error_scaling: f32,

    /// Environment map currently lighting this component
    render_env_map: Option<Arc<REnvMap>>,
    dirty_render_env_map: bool,

    /// Single-precision matrix relative to the world reference position,
    /// staged for the renderer
    render_matrix: Mat4,
    dirty_render_matrix: bool,
}

/// Reference-counted render-side component
#[derive(Debug)]
pub struct RComponent {
    link: WorldLink,
    spatial: SpatialLink,
    prepare_queued: std::sync::atomic::AtomicBool,
    state: RwLock<RComponentState>,
}

impl RComponent {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            prepare_queued: std::sync::atomic::AtomicBool::new(false),
            state: RwLock::new(RComponentState {
                visible: true,
                movement_hint: MovementHint::Stationary,
                layer_mask: LayerMask::default(),
                matrix: DMat4::identity(),
                local_extends: DAabb::from_center_extents(
                    DVec3::zeros(),
                    DVec3::new(0.5, 0.5, 0.5),
                ),
                extends: DAabb::from_center_extents(
                    DVec3::zeros(),
                    DVec3::new(0.5, 0.5, 0.5),
                ),
                lod_count: 1,
                lod_error_scaling: 1.0,
                render_env_map: None,
                dirty_render_env_map: true,
                render_matrix: Mat4::identity(),
                dirty_render_matrix: true,
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

    /// World this component is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// True if the component participates in rendering
    pub fn visible(&self) -> bool {
        self.state.read().unwrap().visible
    }

    /// Movement expectation used for render caching decisions
    pub fn movement_hint(&self) -> MovementHint {
        self.state.read().unwrap().movement_hint
    }

    /// Layers the component renders into
    pub fn layer_mask(&self) -> LayerMask {
        self.state.read().unwrap().layer_mask
    }

    /// World matrix from the last sync
    pub fn matrix(&self) -> DMat4 {
        self.state.read().unwrap().matrix
    }

    /// World-space bounds
    pub fn extends(&self) -> DAabb {
        self.state.read().unwrap().extends
    }

    /// Number of detail levels of the attached model
    pub fn lod_count(&self) -> u32 {
        self.state.read().unwrap().lod_count
    }

    /// Scale applied to model LOD error metrics
    pub fn lod_error_scaling(&self) -> f32 {
        self.state.read().unwrap().lod_error_scaling
    }

    /// Environment map currently lighting this component
    pub fn render_env_map(&self) -> Option<Arc<REnvMap>> {
        self.state.read().unwrap().render_env_map.clone()
    }

    /// Reference-relative render matrix staged at the last prepare
    pub fn render_matrix(&self) -> Mat4 {
        self.state.read().unwrap().render_matrix
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.state.write().unwrap().visible = visible;
    }

    pub(crate) fn set_movement_hint(&self, hint: MovementHint) {
        self.state.write().unwrap().movement_hint = hint;
    }

    pub(crate) fn set_layer_mask(&self, mask: LayerMask) {
        self.state.write().unwrap().layer_mask = mask;
    }

    pub(crate) fn set_model(&self, local_extends: DAabb, lod_count: u32) {
        let mut state = self.state.write().unwrap();
        state.local_extends = local_extends;
        state.lod_count = lod_count.max(1);
    }

    pub(crate) fn set_lod_error_scaling(&self, scaling: f32) {
        self.state.write().unwrap().lod_error_scaling = scaling;
    }

    /// Update the world matrix and derive the world-space bounds
    pub(crate) fn set_matrix(&self, matrix: DMat4) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.matrix = matrix;
        state.extends = state.local_extends.transformed(&matrix);
        state.dirty_render_matrix = true;
        state.extends
    }

    /// Drop the resolved environment map; re-resolved next prepare
    pub(crate) fn invalidate_render_env_map(&self) {
        let mut state = self.state.write().unwrap();
        state.render_env_map = None;
        state.dirty_render_env_map = true;
    }

    /// Drop the resolved environment map only if it is `env_map`
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

    /// The world reference position moved; staged matrices are stale
    pub(crate) fn world_reference_point_changed(&self) {
        self.state.write().unwrap().dirty_render_matrix = true;
    }

    /// Resolve cross-references; render thread only
    ///
    /// Returns true if the component wants another prepare pass: the
    /// environment map could not be resolved yet (the world has none until
    /// the early pass creates the sky fallback).
    pub fn prepare_for_render(&self, world: &Arc<RWorld>, _plan: &RenderPlan) -> bool {
        let needs_env_map = self.state.read().unwrap().dirty_render_env_map;
        if !needs_env_map {
            return false;
        }

        let center = self.state.read().unwrap().extends.center();
        match world.find_best_env_map(center) {
            Some(env_map) => {
                let mut state = self.state.write().unwrap();
                state.render_env_map = Some(env_map);
                state.dirty_render_env_map = false;
                false
            }
            None => true,
        }
    }

    /// Stage renderer-facing data; runs after every prepare queue drained
    pub fn prepare_for_render_render(&self, world: &Arc<RWorld>, _plan: &RenderPlan) {
        let reference = world.reference_position();
        let mut state = self.state.write().unwrap();
        if !state.dirty_render_matrix {
            return;
        }

        let mut relative = state.matrix;
        relative[(0, 3)] -= reference.x;
        relative[(1, 3)] -= reference.y;
        relative[(2, 3)] -= reference.z;
        state.render_matrix = relative.cast::<f32>();
        state.dirty_render_matrix = false;
    }
}
