//! Component resource and its render peer
//!
//! Components are the general mesh-bearing scene objects. Their peer keeps
//! the largest dirty-flag set of the family: resource changes, transform,
//! derived extends and octree placement all invalidate independently.

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{world_matrix, DQuat, DVec3};
use crate::render::component::{MovementHint, RComponent};
use crate::render::world::RWorld;
use crate::scene::{DAabb, LayerMask};
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a component that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ComponentDirty: u32 {
        const MODEL      = 1 << 0;
        const PARAMETERS = 1 << 1;
        const MATRIX     = 1 << 2;
        /// Derived from the matrix, never set directly
        const EXTENDS    = 1 << 3;
        /// Derived from the extends, never set directly
        const OCTREE     = 1 << 4;
        const LAYER_MASK = 1 << 5;
    }
}

/// Mutable component state owned by the logic thread
#[derive(Debug, Clone)]
struct ComponentData {
    position: DVec3,
    orientation: DQuat,
    scaling: DVec3,
    local_extends: DAabb,
    lod_count: u32,
    visible: bool,
    animated: bool,
    movement_hint: MovementHint,
    layer_mask: LayerMask,
}

impl Default for ComponentData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: DQuat::identity(),
            scaling: DVec3::new(1.0, 1.0, 1.0),
            local_extends: DAabb::from_center_extents(
                DVec3::zeros(),
                DVec3::new(0.5, 0.5, 0.5),
            ),
            lod_count: 1,
            visible: true,
            animated: false,
            movement_hint: MovementHint::Stationary,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side scene component
#[derive(Debug)]
pub struct Component {
    data: ComponentData,
    peer: ComponentPeer,
}

impl Component {
    /// Create a component with a unit-box placeholder model
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: ComponentData::default(),
            peer: ComponentPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the component
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_position_changed();
    }

    /// Orientation
    pub fn orientation(&self) -> DQuat {
        self.data.orientation
    }

    /// Rotate the component
    pub fn set_orientation(&mut self, orientation: DQuat) {
        self.data.orientation = orientation;
        self.peer.notify_orientation_changed();
    }

    /// Scale factors
    pub fn scaling(&self) -> DVec3 {
        self.data.scaling
    }

    /// Rescale the component
    pub fn set_scaling(&mut self, scaling: DVec3) {
        self.data.scaling = scaling;
        self.peer.notify_scaling_changed();
    }

    /// Model-space bounds of the attached model
    pub fn local_extends(&self) -> DAabb {
        self.data.local_extends
    }

    /// Number of detail levels of the attached model
    pub fn lod_count(&self) -> u32 {
        self.data.lod_count
    }

    /// Replace the attached model
    ///
    /// The model is represented by its bounds and detail level count; mesh
    /// data itself is managed downstream.
    pub fn set_model(&mut self, local_extends: DAabb, lod_count: u32) {
        self.data.local_extends = local_extends;
        self.data.lod_count = lod_count.max(1);
        self.peer.notify_model_changed();
    }

    /// True if the component participates in rendering
    pub fn visible(&self) -> bool {
        self.data.visible
    }

    /// Toggle visibility
    pub fn set_visible(&mut self, visible: bool) {
        self.data.visible = visible;
        self.peer.notify_visibility_changed();
    }

    /// True if the component animates and re-syncs every frame
    pub fn animated(&self) -> bool {
        self.data.animated
    }

    /// Toggle per-frame animation state updates
    pub fn set_animated(&mut self, animated: bool) {
        self.data.animated = animated;
        self.peer.notify_parameters_changed();
    }

    /// Movement expectation used for render caching decisions
    pub fn movement_hint(&self) -> MovementHint {
        self.data.movement_hint
    }

    /// Change the movement hint
    pub fn set_movement_hint(&mut self, hint: MovementHint) {
        self.data.movement_hint = hint;
        self.peer.notify_parameters_changed();
    }

    /// Layers the component renders into
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// The render mirror of this component
    pub fn render_component(&self) -> &Arc<RComponent> {
        self.peer.r_component()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut ComponentPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &ComponentPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    ///
    /// Returns true if the component must sync again next frame (animated
    /// components advance state every frame).
    pub(crate) fn sync_to_render(&mut self) -> bool {
        self.peer.sync_to_render(&self.data)
    }

    /// True if a sync pass is currently required
    pub(crate) fn requires_sync(&self) -> bool {
        !self.peer.dirty.is_empty() || self.data.animated
    }
}

/// Logic-thread shadow of a component
#[derive(Debug)]
pub(crate) struct ComponentPeer {
    ctx: RenderContext,
    r_component: Arc<RComponent>,
    parent_world: Option<Arc<RWorld>>,
    dirty: ComponentDirty,
    /// Membership in the owning world's sync list
    pub(crate) queued_sync: bool,
}

impl ComponentPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_component: Arc::new(RComponent::new(SpatialLink::new(ctx.next_spatial_id()))),
            parent_world: None,
            dirty: ComponentDirty::all(),
            queued_sync: false,
        }
    }

    pub(crate) fn r_component(&self) -> &Arc<RComponent> {
        &self.r_component
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_component.world_link().has_parent() {
            self.r_component.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(ComponentDirty::OCTREE);
        self.r_component.invalidate_render_env_map();
    }

    fn notify_position_changed(&mut self) {
        self.dirty.insert(ComponentDirty::MATRIX);
    }

    fn notify_orientation_changed(&mut self) {
        self.dirty.insert(ComponentDirty::MATRIX);
    }

    fn notify_scaling_changed(&mut self) {
        self.dirty.insert(ComponentDirty::MATRIX);
    }

    fn notify_model_changed(&mut self) {
        self.dirty.insert(ComponentDirty::MODEL);
        // new model, new bounds
        self.dirty.insert(ComponentDirty::EXTENDS);
    }

    fn notify_visibility_changed(&mut self) {
        self.dirty.insert(ComponentDirty::PARAMETERS);
    }

    fn notify_parameters_changed(&mut self) {
        self.dirty.insert(ComponentDirty::PARAMETERS);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(ComponentDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    ///
    /// Returns true if the component wants another sync next frame.
    fn sync_to_render(&mut self, data: &ComponentData) -> bool {
        if self.dirty.contains(ComponentDirty::MODEL) {
            self.r_component.set_model(data.local_extends, data.lod_count);
            self.dirty.remove(ComponentDirty::MODEL);
        }

        if self.dirty.contains(ComponentDirty::PARAMETERS) {
            self.r_component.set_visible(data.visible);
            self.r_component.set_movement_hint(data.movement_hint);
            let max_scale = data.scaling.x.max(data.scaling.y).max(data.scaling.z);
            self.r_component.set_lod_error_scaling(max_scale as f32);
            self.dirty.remove(ComponentDirty::PARAMETERS);
        }

        // matrix before extends before octree; each derives from the last
        if self.dirty.contains(ComponentDirty::MATRIX) {
            let matrix = world_matrix(data.position, data.orientation, data.scaling);
            self.r_component.set_matrix(matrix);
            self.dirty.remove(ComponentDirty::MATRIX);
            self.dirty.insert(ComponentDirty::EXTENDS);
        }

        if self.dirty.contains(ComponentDirty::EXTENDS) {
            // set_matrix already derived the world bounds; the bit exists
            // so a model change without a move still reaches the octree
            let matrix = world_matrix(data.position, data.orientation, data.scaling);
            self.r_component.set_model(data.local_extends, data.lod_count);
            self.r_component.set_matrix(matrix);
            self.dirty.remove(ComponentDirty::EXTENDS);
            self.dirty.insert(ComponentDirty::OCTREE);
        }

        if self.dirty.contains(ComponentDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_component.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_component.spatial_link(),
                        self.r_component.extends(),
                    );
                }
            }
            self.dirty.remove(ComponentDirty::OCTREE);
        }

        if self.dirty.contains(ComponentDirty::LAYER_MASK) {
            self.r_component.set_layer_mask(data.layer_mask);
            self.dirty.remove(ComponentDirty::LAYER_MASK);
        }

        // animated components advance bone state every frame, which the
        // render side must pick up again
        data.animated
    }

    #[cfg(test)]
    pub(crate) fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }
}

impl Drop for ComponentPeer {
    fn drop(&mut self) {
        if self.r_component.world_link().has_parent() {
            self.r_component.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_component.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    #[test]
    fn test_model_change_cascades_to_extends() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut component = Component::new(&ctx).unwrap();
        component.sync_to_render();
        assert!(component.peer().is_clean());

        component.set_model(
            DAabb::from_center_extents(DVec3::zeros(), DVec3::new(2.0, 2.0, 2.0)),
            3,
        );
        component.sync_to_render();

        assert!(component.peer().is_clean());
        assert_eq!(component.render_component().lod_count(), 3);
        assert_eq!(
            component.render_component().extends().extents(),
            DVec3::new(2.0, 2.0, 2.0)
        );
    }

    #[test]
    fn test_animated_component_requests_resync() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut component = Component::new(&ctx).unwrap();
        assert!(!component.sync_to_render());

        component.set_animated(true);
        assert!(component.sync_to_render(), "animated components re-sync");
    }
}
