//! Debug drawer resource and its render peer

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::context::RenderContext;
use crate::error::SceneError;
use crate::foundation::math::{world_matrix, Color, DQuat, DVec3};
use crate::render::debug_drawer::{RDebugDrawer, RDebugDrawerShape};
use crate::render::world::RWorld;
use crate::scene::DAabb;

bitflags! {
    /// Aspects of a debug drawer that can be independently stale
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct DebugDrawerDirty: u32 {
        const GEOMETRY   = 1 << 0;
        const VISIBILITY = 1 << 1;
        const SHAPES     = 1 << 2;
    }
}

/// One shape of a debug drawer
#[derive(Debug, Clone)]
pub struct DebugDrawerShape {
    /// Edge color of the shape's volumes
    pub edge_color: Color,
    /// Fill color of the shape's volumes
    pub fill_color: Color,
    /// Box volumes in drawer-local space
    pub volumes: Vec<DAabb>,
}

/// Mutable drawer state owned by the logic thread
#[derive(Debug, Clone)]
struct DebugDrawerData {
    position: DVec3,
    orientation: DQuat,
    scaling: DVec3,
    visible: bool,
    xray: bool,
    shapes: Vec<DebugDrawerShape>,
}

impl Default for DebugDrawerData {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: DQuat::identity(),
            scaling: DVec3::new(1.0, 1.0, 1.0),
            visible: true,
            xray: false,
            shapes: Vec::new(),
        }
    }
}

/// Logic-side debug drawer
#[derive(Debug)]
pub struct DebugDrawer {
    data: DebugDrawerData,
    peer: DebugDrawerPeer,
}

impl DebugDrawer {
    /// Create an empty debug drawer
    pub fn new(ctx: &RenderContext) -> Result<Self, SceneError> {
        Ok(Self {
            data: DebugDrawerData::default(),
            peer: DebugDrawerPeer::new(ctx),
        })
    }

    /// World-space position
    pub fn position(&self) -> DVec3 {
        self.data.position
    }

    /// Move the drawer
    pub fn set_position(&mut self, position: DVec3) {
        self.data.position = position;
        self.peer.notify_geometry_changed();
    }

    /// Rotate the drawer
    pub fn set_orientation(&mut self, orientation: DQuat) {
        self.data.orientation = orientation;
        self.peer.notify_geometry_changed();
    }

    /// Rescale the drawer
    pub fn set_scaling(&mut self, scaling: DVec3) {
        self.data.scaling = scaling;
        self.peer.notify_geometry_changed();
    }

    /// True if the drawer renders this frame
    pub fn visible(&self) -> bool {
        self.data.visible
    }

    /// True if the drawer renders on top of scene geometry
    pub fn xray(&self) -> bool {
        self.data.xray
    }

    /// Toggle visibility and xray mode
    pub fn set_visible(&mut self, visible: bool, xray: bool) {
        self.data.visible = visible;
        self.data.xray = xray;
        self.peer.notify_visibility_changed();
    }

    /// Number of shapes
    pub fn shape_count(&self) -> usize {
        self.data.shapes.len()
    }

    /// Replace all shapes
    pub fn set_shapes(&mut self, shapes: Vec<DebugDrawerShape>) {
        self.data.shapes = shapes;
        self.peer.notify_shapes_changed();
    }

    /// Append one shape
    pub fn add_shape(&mut self, shape: DebugDrawerShape) {
        self.data.shapes.push(shape);
        self.peer.notify_shapes_changed();
    }

    /// The render mirror of this drawer
    pub fn render_drawer(&self) -> &Arc<RDebugDrawer> {
        self.peer.r_drawer()
    }

    pub(crate) fn peer_mut(&mut self) -> &mut DebugDrawerPeer {
        &mut self.peer
    }

    pub(crate) fn peer(&self) -> &DebugDrawerPeer {
        &self.peer
    }

    /// Push all dirty aspects into the render mirror
    pub(crate) fn sync_to_render(&mut self) {
        self.peer.sync_to_render(&self.data);
    }
}

/// Logic-thread shadow of a debug drawer
#[derive(Debug)]
pub(crate) struct DebugDrawerPeer {
    ctx: RenderContext,
    r_drawer: Arc<RDebugDrawer>,
    parent_world: Option<Arc<RWorld>>,
    dirty: DebugDrawerDirty,
}

impl DebugDrawerPeer {
    fn new(ctx: &RenderContext) -> Self {
        Self {
            ctx: ctx.clone(),
            r_drawer: Arc::new(RDebugDrawer::new()),
            parent_world: None,
            dirty: DebugDrawerDirty::all(),
        }
    }

    pub(crate) fn r_drawer(&self) -> &Arc<RDebugDrawer> {
        &self.r_drawer
    }

    pub(crate) fn set_parent_world(&mut self, world: Option<Arc<RWorld>>) {
        if self.parent_world.is_none() && world.is_none() {
            return;
        }

        if world.is_none() && self.r_drawer.world_link().has_parent() {
            self.r_drawer.world_link().set_marked_remove(true);
        }

        self.parent_world = world;
    }

    fn notify_geometry_changed(&mut self) {
        self.dirty.insert(DebugDrawerDirty::GEOMETRY);
    }

    fn notify_visibility_changed(&mut self) {
        self.dirty.insert(DebugDrawerDirty::VISIBILITY);
    }

    fn notify_shapes_changed(&mut self) {
        self.dirty.insert(DebugDrawerDirty::SHAPES);
    }

    /// Push dirty aspects in dependency order, clearing each processed bit
    fn sync_to_render(&mut self, data: &DebugDrawerData) {
        if self.dirty.contains(DebugDrawerDirty::GEOMETRY) {
            let matrix = world_matrix(data.position, data.orientation, data.scaling);
            self.r_drawer.set_matrix(matrix);
            self.dirty.remove(DebugDrawerDirty::GEOMETRY);
        }

        if self.dirty.contains(DebugDrawerDirty::VISIBILITY) {
            self.r_drawer.set_visible(data.visible, data.xray);
            self.dirty.remove(DebugDrawerDirty::VISIBILITY);
        }

        if self.dirty.contains(DebugDrawerDirty::SHAPES) {
            let shapes = data
                .shapes
                .iter()
                .map(|shape| RDebugDrawerShape {
                    edge_color: shape.edge_color,
                    fill_color: shape.fill_color,
                    volumes: shape.volumes.clone(),
                })
                .collect();
            self.r_drawer.set_shapes(shapes);
            self.dirty.remove(DebugDrawerDirty::SHAPES);
        }
    }
}

impl Drop for DebugDrawerPeer {
    fn drop(&mut self) {
        if self.r_drawer.world_link().has_parent() {
            // the render pass may still walk the drawer list; flag for the
            // sweep instead of unlinking here
            self.r_drawer.world_link().set_marked_remove(true);
            self.ctx
                .delayed_operations()
                .add_release_object(self.r_drawer.clone() as Arc<dyn Any + Send + Sync>);
        }
    }
}
