//! Prop field resource and its render peer
//!
//! Prop fields scatter large numbers of small props over terrain. The
//! logic side decides placement and density (via the listener callback and
//! the LOD level); the peer stages the surviving instances as GPU-ready
//! records for the render side.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::DVec3;
use crate::render::prop_field::{PropInstanceData, RPropField};
use crate::render::world::RWorld;
use crate::scene::DAabb;
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a prop field that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PropFieldDirty: u32 {
        const GEOMETRY    = 1 << 0;
        const TYPES       = 1 << 1;
        /// Forced whenever TYPES is processed
        const INSTANCES   = 1 << 2;
        const BEND_STATES = 1 << 3;
        /// Derived from geometry, never set directly
        const OCTREE      = 1 << 4;
    }
}

/// Number of detail levels a prop field steps through
pub const PROP_FIELD_LOD_LEVELS: u32 = 4;

/// One prop instance placed by gameplay
#[derive(Debug, Clone, Copy)]
pub struct PropInstance {
    /// Position relative to the field origin
    pub position: DVec3,
    /// Euler rotation in radians
    pub rotation: [f32; 3],
    /// Uniform scale
    pub scaling: f32,
    /// Index into the type's bend state table
    pub bend_state: u32,
}

/// One prop type: shared model/skin plus its instances
#[derive(Debug, Clone, Default)]
pub struct PropFieldType {
    /// Fraction of instances kept at full detail (0..=1)
    pub density: f32,
    /// Placed instances
    pub instances: Vec<PropInstance>,
    /// Wind bend states referenced by the instances
    pub bend_states: Vec<f32>,
}

/// Callback populating a field's instances when it comes into range
pub trait PropFieldListener: Send {
    /// Fill `types` with instances for the requested density
    fn create_instances(&self, types: &mut Vec<PropFieldType>, density: f32);
}

/// Mutable prop field state owned by the logic thread
#[derive(Debug, Clone)]
struct PropFieldData {
    position: DVec3,
    extents: DVec3,
    types: Vec<PropFieldType>,
}

impl Default for PropFieldData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            extents: DVec3::new(50.0, 10.0, 50.0),
            types: Vec::new(),
        }
    }
}

/// Logic-side prop field
pub struct PropField {
    data: PropFieldData,
    listener: Option<Box<dyn PropFieldListener>>,
    lod_level: u32,
    /// Lowest level any camera computed this frame, committed at sync
    frame_lod_level: Option<u32>,
    peer: PropFieldPeer,
}

impl PropField {
    /// Create an empty prop field
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: PropFieldData::default(),
            listener: None,
            lod_level: PROP_FIELD_LOD_LEVELS - 1,
            frame_lod_level: None,
            peer: PropFieldPeer::new(ctx),
        })
    }

    /// World-space origin of the field
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the field
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Half-size of the field
    pub fn extents(&self) -> DVec3 {
        self.data.extents
    }

    /// Resize the field
    pub fn set_extents(&mut self, extents: DVec3) {
        self.data.extents = extents;
        self.peer.notify_geometry_changed();
    }

    /// Number of prop types
    pub fn type_count(&self) -> usize {
        self.data.types.len()
    }

    /// Replace the type table
    pub fn set_types(&mut self, types: Vec<PropFieldType>) {
        self.data.types = types;
        self.peer.notify_types_changed();
    }

    /// Update one type's bend states (wind simulation output)
    pub fn set_bend_states(&mut self, type_index: usize, bend_states: Vec<f32>) {
        if let Some(prop_type) = self.data.types.get_mut(type_index) {
            prop_type.bend_states = bend_states;
            self.peer.notify_bend_states_changed();
        }
    }

    /// Install the instance creation callback
    pub fn set_listener(&mut self, listener: Box<dyn PropFieldListener>) {
        self.listener = Some(listener);
    }

    /// Current detail level (0 = full detail)
    pub fn lod_level(&self) -> u32 {
        self.lod_level
    }

    /// Account for a camera looking at the field this frame
    ///
    /// The field keeps one shared LOD level per frame: the lowest (most
    /// detailed) level any camera computes wins, so with several cameras
    /// the field renders at the detail the closest camera needs. A known
    /// simplification kept as documented behavior.
    pub fn test_lod_level(&mut self, camera_position: DVec3) {
        let distance = (camera_position - self.data.position).norm();
        let range = self.data.extents.x.max(self.data.extents.z).max(1.0);

        let level = if distance < range {
            0
        } else {
            let steps = (distance / range).log2().floor();
            (steps.max(0.0) as u32 + 1).min(PROP_FIELD_LOD_LEVELS - 1)
        };

        self.frame_lod_level = Some(match self.frame_lod_level {
            Some(current) => current.min(level),
            None => level,
        });
    }

    /// Commit the frame's negotiated LOD level
    ///
    /// Entering range for the first time triggers the listener to populate
    /// the instances; any level change re-stages the instance counts.
    pub fn update_instance_counts(&mut self) {
        let Some(level) = self.frame_lod_level.take() else {
            return;
        };
        if level == self.lod_level {
            return;
        }

        let was_out_of_range = self.lod_level >= PROP_FIELD_LOD_LEVELS - 1;
        self.lod_level = level;

        if was_out_of_range && level < PROP_FIELD_LOD_LEVELS - 1 {
            if let Some(listener) = self.listener.take() {
                let density = self.density();
                listener.create_instances(&mut self.data.types, density);
                self.listener = Some(listener);
                self.peer.notify_types_changed();
            }
        }

        self.peer.notify_instances_changed();
    }

    /// Density fraction for the current LOD level
    pub fn density(&self) -> f32 {
        1.0 / f32::from(1u16 << self.lod_level.min(15))
    }

    /// The render mirror of this prop field
    pub fn render_prop_field(&self) -> &Arc<RPropField> {
        self.peer.r_prop_field()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut PropFieldPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &PropFieldPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        // commit the level the frame's cameras negotiated before staging
        self.update_instance_counts();
        let density = self.density();
        self.peer.sync_to_render(&self.data, density);
    }
}

impl fmt::Debug for PropField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropField")
            .field("position", &self.data.position)
            .field("types", &self.data.types.len())
            .field("lod_level", &self.lod_level)
            .finish_non_exhaustive()
    }
}

/// Logic-thread shadow of a prop field
#[derive(Debug)]
pub(crate) struct PropFieldPeer {
    ctx: RenderContext,
    r_prop_field: Arc<RPropField>,
    parent_world: Option<Arc<RWorld>>,
    dirty: PropFieldDirty,
}

impl PropFieldPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_prop_field: Arc::new(RPropField::new(SpatialLink::new(ctx.next_spatial_id()))),
            parent_world: None,
            dirty: PropFieldDirty::all(),
        }
    }

    pub(crate) fn r_prop_field(&self) -> &Arc<RPropField> {
        &self.r_prop_field
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_prop_field.world_link().has_parent() {
            self.r_prop_field.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(PropFieldDirty::OCTREE);
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(PropFieldDirty::GEOMETRY);
    }

    fn notify_types_changed(&mut self) {
        self.dirty.insert(PropFieldDirty::TYPES);
    }

    fn notify_instances_changed(&mut self) {
        self.dirty.insert(PropFieldDirty::INSTANCES);
    }

    fn notify_bend_states_changed(&mut self) {
        self.dirty.insert(PropFieldDirty::BEND_STATES);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &PropFieldData, density: f32) {
        if self.dirty.contains(PropFieldDirty::GEOMETRY) {
            let extends = DAabb::from_center_extents(data.position, data.extents);
            self.r_prop_field.set_geometry(data.position, extends);
            self.dirty.remove(PropFieldDirty::GEOMETRY);
            self.dirty.insert(PropFieldDirty::OCTREE);
        }

        if self.dirty.contains(PropFieldDirty::TYPES) {
            self.r_prop_field.set_type_count(data.types.len());
            self.dirty.remove(PropFieldDirty::TYPES);
            // a new type table always invalidates the staged instances
            self.dirty.insert(PropFieldDirty::INSTANCES);
            self.dirty.insert(PropFieldDirty::BEND_STATES);
        }

        if self.dirty.contains(PropFieldDirty::INSTANCES) {
            for (index, prop_type) in data.types.iter().enumerate() {
                let keep = instance_budget(prop_type.instances.len(), density);
                let staged = prop_type.instances[..keep]
                    .iter()
                    .map(|instance| PropInstanceData {
                        position: [
                            (instance.position.x - data.position.x) as f32,
                            (instance.position.y - data.position.y) as f32,
                            (instance.position.z - data.position.z) as f32,
                        ],
                        rotation: instance.rotation,
                        scaling: instance.scaling,
                        bend_state: instance.bend_state,
                    })
                    .collect();
                self.r_prop_field.stage_instances(index, staged);
            }
            self.dirty.remove(PropFieldDirty::INSTANCES);
        }

        if self.dirty.contains(PropFieldDirty::BEND_STATES) {
            for (index, prop_type) in data.types.iter().enumerate() {
                self.r_prop_field
                    .stage_bend_states(index, prop_type.bend_states.clone());
            }
            self.dirty.remove(PropFieldDirty::BEND_STATES);
        }

        if self.dirty.contains(PropFieldDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_prop_field.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_prop_field.spatial_link(),
                        self.r_prop_field.extends(),
                    );
                }
            }
            self.dirty.remove(PropFieldDirty::OCTREE);
        }
    }

}

/// Instances surviving at the given density
fn instance_budget(count: usize, density: f32) -> usize {
    ((count as f32) * density.clamp(0.0, 1.0)).round() as usize
}

impl Drop for PropFieldPeer {
    fn drop(&mut self) {
        if self.r_prop_field.world_link().has_parent() {
            self.r_prop_field.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_prop_field.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;

    struct GrassListener;

    impl PropFieldListener for GrassListener {
        fn create_instances(&self, types: &mut Vec<PropFieldType>, _density: f32) {
            let instances = (0..8)
                .map(|i| PropInstance {
                    position: DVec3::new(f64::from(i), 0.0, 0.0),
                    rotation: [0.0; 3],
                    scaling: 1.0,
                    bend_state: 0,
                })
                .collect();
            types.push(PropFieldType {
                density: 1.0,
                instances,
                bend_states: vec![0.0; 4],
            });
        }
    }

    #[test]
    fn test_entering_range_invokes_listener() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut field = PropField::new(&ctx).unwrap();
        field.set_listener(Box::new(GrassListener));
        assert_eq!(field.type_count(), 0);

        field.test_lod_level(DVec3::new(10.0, 0.0, 0.0));
        field.update_instance_counts();
        assert_eq!(field.type_count(), 1, "listener populated the field");
        assert_eq!(field.lod_level(), 0);
    }

    #[test]
    fn test_lowest_lod_level_wins_across_cameras() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut field = PropField::new(&ctx).unwrap();
        field.set_listener(Box::new(GrassListener));

        // far and close camera in the same frame: the close one wins
        field.test_lod_level(DVec3::new(400.0, 0.0, 0.0));
        field.test_lod_level(DVec3::new(10.0, 0.0, 0.0));
        field.test_lod_level(DVec3::new(400.0, 0.0, 0.0));
        field.update_instance_counts();
        assert_eq!(field.lod_level(), 0);

        // next frame with only the far camera raises the level again
        field.test_lod_level(DVec3::new(400.0, 0.0, 0.0));
        field.update_instance_counts();
        assert!(field.lod_level() > 0);
    }

    #[test]
    fn test_density_halves_per_level() {
        let ctx = RenderContext::new(SyncConfig::default());
        let mut field = PropField::new(&ctx).unwrap();
        assert!(field.density() < 1.0, "starts out of range");

        field.test_lod_level(DVec3::zeros());
        field.update_instance_counts();
        assert!((field.density() - 1.0).abs() < f32::EPSILON);
    }
}
