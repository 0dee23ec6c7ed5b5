//! Render-side prop field
//!
//! A prop field holds thousands of small instanced props (grass, rubble)
//! grouped into types sharing a model and skin. Only derived, GPU-ready
//! instance records live here; placement and density decisions happen on
//! the logic side.

use std::sync::{Arc, RwLock};

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::DVec3;
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::DAabb;
use crate::spatial::SpatialLink;

/// GPU-ready prop instance record, staged for upload
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PropInstanceData {
    /// Position relative to the prop field origin
    pub position: [f32; 3],
    /// Euler rotation in radians
    pub rotation: [f32; 3],
    /// Uniform scale
    pub scaling: f32,
    /// Index into the bend state table
    pub bend_state: u32,
}

/// One prop type inside a render-side prop field
#[derive(Debug, Default)]
pub struct RPropFieldType {
    /// Staged instance records, rebuilt when instances change
    instances: Vec<PropInstanceData>,

    /// Wind bend states referenced by the instances
    bend_states: Vec<f32>,

    /// Instance records are stale
    dirty_instances: bool,

    /// Bend states are stale
    dirty_bend_states: bool,
}

impl RPropFieldType {
    /// Staged instance records
    pub fn instances(&self) -> &[PropInstanceData] {
        &self.instances
    }

    /// Staged bend states
    pub fn bend_states(&self) -> &[f32] {
        &self.bend_states
    }

    /// True if the instance buffer must be re-uploaded this frame
    pub fn instances_stale(&self) -> bool {
        self.dirty_instances
    }

    /// True if the bend state buffer must be re-uploaded this frame
    pub fn bend_states_stale(&self) -> bool {
        self.dirty_bend_states
    }
}

/// State behind the prop field's lock
#[derive(Debug)]
struct RPropFieldState {
    position: DVec3,
    extends: DAabb,
    types: Vec<RPropFieldType>,

    /// Pending instance data per type, moved into place during prepare
    pending_instances: Vec<Option<Vec<PropInstanceData>>>,
    pending_bend_states: Vec<Option<Vec<f32>>>,
}

/// Reference-counted render-side prop field
#[derive(Debug)]
pub struct RPropField {
    link: WorldLink,
    spatial: SpatialLink,
    prepare_queued: std::sync::atomic::AtomicBool,
    state: RwLock<RPropFieldState>,
}

impl RPropField {
    pub(crate) fn new(spatial: SpatialLink) -> Self {
        Self {
            link: WorldLink::new(),
            spatial,
            prepare_queued: std::sync::atomic::AtomicBool::new(false),
            state: RwLock::new(RPropFieldState {
                position: DVec3::zeros(),
                extends: DAabb::from_center_extents(DVec3::zeros(), DVec3::new(1.0, 1.0, 1.0)),
                types: Vec::new(),
                pending_instances: Vec::new(),
                pending_bend_states: Vec::new(),
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

    /// World this prop field is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// World-space origin of the field
    pub fn position(&self) -> DVec3 {
        self.state.read().unwrap().position
    }

    /// World-space bounds of the field
    pub fn extends(&self) -> DAabb {
        self.state.read().unwrap().extends
    }

    /// Number of prop types
    pub fn type_count(&self) -> usize {
        self.state.read().unwrap().types.len()
    }

    /// Staged instance count of a type, 0 if out of range
    pub fn type_instance_count(&self, index: usize) -> usize {
        self.state
            .read()
            .unwrap()
            .types
            .get(index)
            .map_or(0, |t| t.instances.len())
    }

    /// Run `f` against the staged type table (upload inspection)
    pub fn with_types<R>(&self, f: impl FnOnce(&[RPropFieldType]) -> R) -> R {
        f(&self.state.read().unwrap().types)
    }

    pub(crate) fn set_geometry(&self, position: DVec3, extends: DAabb) -> DAabb {
        let mut state = self.state.write().unwrap();
        state.position = position;
        state.extends = extends;
        extends
    }

    /// Resize the type table; staged data of removed types is dropped
    pub(crate) fn set_type_count(&self, count: usize) {
        let mut state = self.state.write().unwrap();
        state.types.resize_with(count, RPropFieldType::default);
        state.pending_instances.resize_with(count, || None);
        state.pending_bend_states.resize_with(count, || None);
    }

    /// Queue new instance records for a type, applied at the next prepare
    pub(crate) fn stage_instances(&self, type_index: usize, instances: Vec<PropInstanceData>) {
        let mut state = self.state.write().unwrap();
        if type_index < state.pending_instances.len() {
            state.pending_instances[type_index] = Some(instances);
        }
    }

    /// Queue new bend states for a type, applied at the next prepare
    pub(crate) fn stage_bend_states(&self, type_index: usize, bend_states: Vec<f32>) {
        let mut state = self.state.write().unwrap();
        if type_index < state.pending_bend_states.len() {
            state.pending_bend_states[type_index] = Some(bend_states);
        }
    }

    /// Move pending instance data into place; render thread only
    ///
    /// Returns true if the field wants another prepare pass.
    pub fn prepare_for_render(&self) -> bool {
        let mut state = self.state.write().unwrap();
        for index in 0..state.types.len() {
            if let Some(instances) = state.pending_instances[index].take() {
                let prop_type = &mut state.types[index];
                prop_type.instances = instances;
                prop_type.dirty_instances = true;
            }
            if let Some(bend_states) = state.pending_bend_states[index].take() {
                let prop_type = &mut state.types[index];
                prop_type.bend_states = bend_states;
                prop_type.dirty_bend_states = true;
            }
        }
        false
    }

    /// Finalize staged buffers after all prepare queues drained
    pub fn prepare_for_render_render(&self) {
        let mut state = self.state.write().unwrap();
        for prop_type in &mut state.types {
            // upload happens downstream; here the staging flags flip so the
            // renderer knows which buffers to refresh this frame
            prop_type.dirty_instances = false;
            prop_type.dirty_bend_states = false;
        }
    }

    pub(crate) fn world_reference_point_changed(&self) {
        // instance records are field-relative and unaffected; the staged
        // field matrix is recomputed from double precision each frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{SpatialId, SpatialLink};

    #[test]
    fn test_staged_instances_apply_on_prepare() {
        let field = RPropField::new(SpatialLink::new(SpatialId::new(1)));
        field.set_type_count(2);

        field.stage_instances(
            1,
            vec![PropInstanceData {
                position: [1.0, 0.0, 2.0],
                rotation: [0.0; 3],
                scaling: 1.0,
                bend_state: 0,
            }],
        );

        assert_eq!(field.type_instance_count(1), 0, "staged, not yet applied");
        field.prepare_for_render();
        assert_eq!(field.type_instance_count(1), 1);
    }

    #[test]
    fn test_out_of_range_type_is_ignored() {
        let field = RPropField::new(SpatialLink::new(SpatialId::new(2)));
        field.set_type_count(1);
        field.stage_instances(5, Vec::new());
        field.prepare_for_render();
        assert_eq!(field.type_count(), 1);
    }
}
