//! Render-side debug drawer
//!
//! Debug drawers visualize development data (collision volumes, paths,
//! markers) as colored wireframe boxes. The render side stages a flat
//! line-list vertex buffer rebuilt whenever the shapes change.

use std::sync::{Arc, RwLock};

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Color, DMat4, DVec3};
use crate::render::world::RWorld;
use crate::render::WorldLink;
use crate::scene::DAabb;

/// GPU-ready debug line vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DebugVertex {
    /// Position relative to the drawer origin
    pub position: [f32; 3],
    /// RGBA line color
    pub color: [f32; 4],
}

/// One shape of a debug drawer, resolved for rendering
#[derive(Debug, Clone)]
pub struct RDebugDrawerShape {
    /// Edge color of the shape's volumes
    pub edge_color: Color,
    /// Fill color of the shape's volumes (unused by the line stage)
    pub fill_color: Color,
    /// Box volumes in drawer-local space
    pub volumes: Vec<DAabb>,
}

/// State behind the debug drawer's lock
#[derive(Debug)]
struct RDebugDrawerState {
    matrix: DMat4,
    visible: bool,
    xray: bool,
    shapes: Vec<RDebugDrawerShape>,

    /// Staged line-list vertices, rebuilt when shapes change
    vertices: Vec<DebugVertex>,
    dirty_vertices: bool,
}

/// Reference-counted render-side debug drawer
#[derive(Debug)]
pub struct RDebugDrawer {
    link: WorldLink,
    state: RwLock<RDebugDrawerState>,
}

/// Edge list of a unit box as corner index pairs
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 3), (3, 2), (2, 0), // bottom
    (4, 5), (5, 7), (7, 6), (6, 4), // top
    (0, 4), (1, 5), (2, 6), (3, 7), // verticals
];

impl RDebugDrawer {
    pub(crate) fn new() -> Self {
        Self {
            link: WorldLink::new(),
            state: RwLock::new(RDebugDrawerState {
                matrix: DMat4::identity(),
                visible: true,
                xray: false,
                shapes: Vec::new(),
                vertices: Vec::new(),
                dirty_vertices: false,
            }),
        }
    }

    pub(crate) fn world_link(&self) -> &WorldLink {
        &self.link
    }

    /// World this drawer is linked into, if any
    pub fn parent_world(&self) -> Option<Arc<RWorld>> {
        self.link.parent_world()
    }

    /// Two-phase-delete marker
    pub fn world_marked_remove(&self) -> bool {
        self.link.marked_remove()
    }

    /// True if the drawer renders this frame
    pub fn visible(&self) -> bool {
        self.state.read().unwrap().visible
    }

    /// True if the drawer renders on top of scene geometry
    pub fn xray(&self) -> bool {
        self.state.read().unwrap().xray
    }

    /// World matrix from the last sync
    pub fn matrix(&self) -> DMat4 {
        self.state.read().unwrap().matrix
    }

    /// Number of shapes
    pub fn shape_count(&self) -> usize {
        self.state.read().unwrap().shapes.len()
    }

    /// Number of staged line vertices
    pub fn vertex_count(&self) -> usize {
        self.state.read().unwrap().vertices.len()
    }

    /// Copy of the staged line vertices (upload inspection)
    pub fn copy_vertices(&self) -> Vec<DebugVertex> {
        self.state.read().unwrap().vertices.clone()
    }

    pub(crate) fn set_matrix(&self, matrix: DMat4) {
        self.state.write().unwrap().matrix = matrix;
    }

    pub(crate) fn set_visible(&self, visible: bool, xray: bool) {
        let mut state = self.state.write().unwrap();
        state.visible = visible;
        state.xray = xray;
    }

    pub(crate) fn set_shapes(&self, shapes: Vec<RDebugDrawerShape>) {
        let mut state = self.state.write().unwrap();
        state.shapes = shapes;
        state.dirty_vertices = true;
    }

    /// Rebuild the staged vertex buffer if the shapes changed
    ///
    /// Render thread only; the world calls this for every visible drawer
    /// during the prepare pass.
    pub fn update_vertices(&self) {
        let mut state = self.state.write().unwrap();
        if !state.dirty_vertices {
            return;
        }

        let mut vertices = Vec::new();
        for shape in &state.shapes {
            let color = [
                shape.edge_color.x,
                shape.edge_color.y,
                shape.edge_color.z,
                shape.edge_color.w,
            ];
            for volume in &shape.volumes {
                let corners = box_corners(volume);
                for (a, b) in BOX_EDGES {
                    vertices.push(DebugVertex { position: corners[a], color });
                    vertices.push(DebugVertex { position: corners[b], color });
                }
            }
        }

        state.vertices = vertices;
        state.dirty_vertices = false;
    }
}

fn box_corners(volume: &DAabb) -> [[f32; 3]; 8] {
    let mut corners = [[0.0f32; 3]; 8];
    for (index, corner) in corners.iter_mut().enumerate() {
        let select = |bit: usize, min: f64, max: f64| {
            if index & bit != 0 { max as f32 } else { min as f32 }
        };
        *corner = [
            select(1, volume.min.x, volume.max.x),
            select(2, volume.min.y, volume.max.y),
            select(4, volume.min.z, volume.max.z),
        ];
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_shape() -> RDebugDrawerShape {
        RDebugDrawerShape {
            edge_color: Color::new(1.0, 0.0, 0.0, 1.0),
            fill_color: Color::new(1.0, 0.0, 0.0, 0.2),
            volumes: vec![DAabb::from_center_extents(
                DVec3::zeros(),
                DVec3::new(0.5, 0.5, 0.5),
            )],
        }
    }

    #[test]
    fn test_vertex_rebuild_on_shape_change() {
        let drawer = RDebugDrawer::new();
        assert_eq!(drawer.vertex_count(), 0);

        drawer.set_shapes(vec![unit_shape()]);
        drawer.update_vertices();
        // 12 edges, 2 vertices each
        assert_eq!(drawer.vertex_count(), 24);

        drawer.set_shapes(vec![unit_shape(), unit_shape()]);
        drawer.update_vertices();
        assert_eq!(drawer.vertex_count(), 48);
    }

    #[test]
    fn test_update_without_changes_keeps_buffer() {
        let drawer = RDebugDrawer::new();
        drawer.set_shapes(vec![unit_shape()]);
        drawer.update_vertices();
        let count = drawer.vertex_count();
        drawer.update_vertices();
        assert_eq!(drawer.vertex_count(), count);
    }
}
