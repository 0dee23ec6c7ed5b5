//! Billboard resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::DVec3;
use crate::render::billboard::RBillboard;
use crate::render::world::RWorld;
use crate::scene::LayerMask;
use crate::spatial::SpatialLink;

bitflags! {
    /// Aspects of a billboard that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BillboardDirty: u32 {
        const PARAMETERS = 1 << 0;
        const GEOMETRY   = 1 << 1;
        /// Derived from geometry, never set directly
        const OCTREE     = 1 << 2;
        const LAYER_MASK = 1 << 3;
    }
}

/// Mutable billboard state owned by the logic thread
#[derive(Debug, Clone)]
struct BillboardData {
    position: DVec3,
    axis: DVec3,
    size: (f32, f32),
    offset: (f32, f32),
    locked: bool,
    spherical: bool,
    size_fixed_to_screen: bool,
    visible: bool,
    layer_mask: LayerMask,
}

impl Default for BillboardData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            axis: DVec3::new(0.0, 1.0, 0.0),
            size: (1.0, 1.0),
            offset: (0.0, 0.0),
            locked: false,
            spherical: true,
            size_fixed_to_screen: false,
            visible: true,
            layer_mask: LayerMask::default(),
        }
    }
}

/// Logic-side billboard
#[derive(Debug)]
pub struct Billboard {
    data: BillboardData,
    peer: BillboardPeer,
}

impl Billboard {
    /// Create a billboard with engine default parameters
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: BillboardData::default(),
            peer: BillboardPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the billboard
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Rotation axis for locked billboards
    pub fn axis(&self) -> DVec3 {
        self.data.axis
    }

    /// Change the rotation axis
    pub fn set_axis(&mut self, axis: DVec3) {
        self.data.axis = axis;
        self.peer.notify_parameters_changed();
    }

    /// Width and height in meters
    pub fn size(&self) -> (f32, f32) {
        self.data.size
    }

    /// Resize the billboard; the bounds follow
    pub fn set_size(&mut self, size: (f32, f32)) {
        self.data.size = size;
        self.peer.notify_parameters_changed();
        self.peer.notify_geometry_changed();
    }

    /// Offset of the image relative to the position
    pub fn offset(&self) -> (f32, f32) {
        self.data.offset
    }

    /// Change the image offset
    pub fn set_offset(&mut self, offset: (f32, f32)) {
        self.data.offset = offset;
        self.peer.notify_parameters_changed();
    }

    /// True if the billboard only rotates around its axis
    pub fn locked(&self) -> bool {
        self.data.locked
    }

    /// True if the billboard always faces the camera
    pub fn spherical(&self) -> bool {
        self.data.spherical
    }

    /// Set the facing mode
    pub fn set_facing(&mut self, locked: bool, spherical: bool, size_fixed_to_screen: bool) {
        self.data.locked = locked;
        self.data.spherical = spherical;
        self.data.size_fixed_to_screen = size_fixed_to_screen;
        self.peer.notify_parameters_changed();
    }

    /// True if the billboard participates in rendering
    pub fn visible(&self) -> bool {
        self.data.visible
    }

    /// Toggle visibility
    pub fn set_visible(&mut self, visible: bool) {
        self.data.visible = visible;
        self.peer.notify_parameters_changed();
    }

    /// Layers the billboard renders into
    pub fn layer_mask(&self) -> LayerMask {
        self.data.layer_mask
    }

    /// Change the layer mask
    pub fn set_layer_mask(&mut self, mask: LayerMask) {
        self.data.layer_mask = mask;
        self.peer.notify_layer_mask_changed();
    }

    /// The render mirror of this billboard
    pub fn render_billboard(&self) -> &Arc<RBillboard> {
        self.peer.r_billboard()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut BillboardPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &BillboardPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) -> bool {
        self.peer.sync_to_render(&self.data)
    }

    /// True if a sync pass is currently required
    pub(crate) fn requires_sync(&self) -> bool {
        !self.peer.dirty.is_empty()
    }
}

/// Logic-thread shadow of a billboard
#[derive(Debug)]
pub(crate) struct BillboardPeer {
    ctx: RenderContext,
    r_billboard: Arc<RBillboard>,
    parent_world: Option<Arc<RWorld>>,
    dirty: BillboardDirty,
    /// Membership in the owning world's sync list
    pub(crate) queued_sync: bool,
}

impl BillboardPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_billboard: Arc::new(RBillboard::new(SpatialLink::new(ctx.next_spatial_id()))),
            parent_world: None,
            dirty: BillboardDirty::all(),
            queued_sync: false,
        }
    }

    pub(crate) fn r_billboard(&self) -> &Arc<RBillboard> {
        &self.r_billboard
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_billboard.world_link().has_parent() {
            self.r_billboard.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
        self.dirty.insert(BillboardDirty::OCTREE);
        self.r_billboard.invalidate_render_env_map();
    }

    fn notify_parameters_changed(&mut self) {
        self.dirty.insert(BillboardDirty::PARAMETERS);
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(BillboardDirty::GEOMETRY);
    }

    fn notify_layer_mask_changed(&mut self) {
        self.dirty.insert(BillboardDirty::LAYER_MASK);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &BillboardData) -> bool {
        if self.dirty.contains(BillboardDirty::PARAMETERS) {
            self.r_billboard.set_parameters(
                data.axis,
                data.size,
                data.offset,
                data.locked,
                data.spherical,
                data.size_fixed_to_screen,
                data.visible,
            );
            self.dirty.remove(BillboardDirty::PARAMETERS);
            // the bounds radius depends on the size
            self.dirty.insert(BillboardDirty::GEOMETRY);
        }

        if self.dirty.contains(BillboardDirty::GEOMETRY) {
            self.r_billboard.set_geometry(data.position);
            self.dirty.remove(BillboardDirty::GEOMETRY);
            self.dirty.insert(BillboardDirty::OCTREE);
        }

        if self.dirty.contains(BillboardDirty::OCTREE) {
            if let Some(world) = &self.parent_world {
                if self.r_billboard.world_link().is_parent(world) {
                    world.update_octree_entry(
                        self.r_billboard.spatial_link(),
                        self.r_billboard.extends(),
                    );
                }
            }
            self.dirty.remove(BillboardDirty::OCTREE);
        }

        if self.dirty.contains(BillboardDirty::LAYER_MASK) {
            self.r_billboard.set_layer_mask(data.layer_mask);
            self.dirty.remove(BillboardDirty::LAYER_MASK);
        }

        false
    }
}

impl Drop for BillboardPeer {
    fn drop(&mut self) {
        if self.r_billboard.world_link().has_parent() {
            self.r_billboard.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_billboard.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
