//! Octree spatial partitioning structure
//!
//! Divides world space into hierarchical octants so spatial queries avoid
//! iterating every object. Entries are placed in the deepest node that fully
//! contains their bounding box, down to a fixed insertion depth; objects
//! straddling a split plane stay in the parent node.

use crate::foundation::math::DVec3;
use crate::scene::DAabb;

/// Identifier of a spatially indexed object, assigned by the owning world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialId(u64);

impl SpatialId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Entry stored in the octree: an object id with its world-space bounds
#[derive(Debug, Clone, Copy)]
pub struct OctreeEntry {
    /// Id of the indexed object
    pub id: SpatialId,
    /// World-space bounds at insertion time
    pub bounds: DAabb,
}

/// Single node in the octree hierarchy
#[derive(Debug)]
struct OctreeNode {
    /// World-space bounds of this node
    bounds: DAabb,

    /// Entries that fit this node but straddle its split planes (or this is
    /// a maximum-depth node)
    entries: Vec<OctreeEntry>,

    /// Child octants, created lazily
    children: [Option<Box<OctreeNode>>; 8],

    /// Depth in the tree (0 = root)
    depth: u32,
}

impl OctreeNode {
    fn new(bounds: DAabb, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: Default::default(),
            depth,
        }
    }

    /// Octant index for a box fully on one side of every split plane,
    /// None if the box straddles a plane
    ///
    /// Octant layout: bit 0 = +X, bit 1 = +Y, bit 2 = +Z.
    fn octant_for(&self, bounds: &DAabb) -> Option<usize> {
        let center = self.bounds.center();
        let x_bit = if bounds.min.x >= center.x {
            1
        } else if bounds.max.x <= center.x {
            0
        } else {
            return None;
        };
        let y_bit = if bounds.min.y >= center.y {
            2
        } else if bounds.max.y <= center.y {
            0
        } else {
            return None;
        };
        let z_bit = if bounds.min.z >= center.z {
            4
        } else if bounds.max.z <= center.z {
            0
        } else {
            return None;
        };
        Some(z_bit | y_bit | x_bit)
    }

    fn child_bounds(&self, octant: usize) -> DAabb {
        let center = self.bounds.center();
        let quarter = self.bounds.extents() * 0.5;
        let child_center = DVec3::new(
            center.x + quarter.x * (if octant & 1 != 0 { 1.0 } else { -1.0 }),
            center.y + quarter.y * (if octant & 2 != 0 { 1.0 } else { -1.0 }),
            center.z + quarter.z * (if octant & 4 != 0 { 1.0 } else { -1.0 }),
        );
        DAabb::from_center_extents(child_center, quarter)
    }

    fn insert(&mut self, entry: OctreeEntry, max_depth: u32) {
        // only descend while the node fully contains the bounds; entries
        // reaching outside the tree stay in the root
        if self.depth < max_depth && self.bounds.contains(&entry.bounds) {
            if let Some(octant) = self.octant_for(&entry.bounds) {
                let child_bounds = self.child_bounds(octant);
                let child_depth = self.depth + 1;
                let child = self.children[octant].get_or_insert_with(|| {
                    Box::new(OctreeNode::new(child_bounds, child_depth))
                });
                child.insert(entry, max_depth);
                return;
            }
        }

        self.entries.push(entry);
    }

    /// Remove an entry by id, descending along the path its bounds dictate
    fn remove(&mut self, id: SpatialId, bounds: &DAabb, max_depth: u32) -> bool {
        if self.depth < max_depth && self.bounds.contains(bounds) {
            if let Some(octant) = self.octant_for(bounds) {
                return self.children[octant]
                    .as_mut()
                    .is_some_and(|child| child.remove(id, bounds, max_depth));
            }
        }

        if let Some(index) = self.entries.iter().position(|e| e.id == id) {
            self.entries.swap_remove(index);
            return true;
        }

        false
    }

    fn query_box(&self, query: &DAabb, results: &mut Vec<OctreeEntry>) {
        for entry in &self.entries {
            if entry.bounds.intersects(query) {
                results.push(*entry);
            }
        }

        for child in self.children.iter().flatten() {
            if child.bounds.intersects(query) {
                child.query_box(query, results);
            }
        }
    }

    fn query_sphere(&self, center: DVec3, radius: f64, results: &mut Vec<OctreeEntry>) {
        for entry in &self.entries {
            if entry.bounds.intersects_sphere(center, radius) {
                results.push(*entry);
            }
        }

        for child in self.children.iter().flatten() {
            if child.bounds.intersects_sphere(center, radius) {
                child.query_sphere(center, radius, results);
            }
        }
    }

    fn visit_all(&self, results: &mut Vec<OctreeEntry>) {
        results.extend_from_slice(&self.entries);
        for child in self.children.iter().flatten() {
            child.visit_all(results);
        }
    }

    fn count_entries(&self) -> usize {
        let mut count = self.entries.len();
        for child in self.children.iter().flatten() {
            count += child.count_entries();
        }
        count
    }
}

/// Octree spatial partitioning structure
#[derive(Debug)]
pub struct Octree {
    /// Root node spanning the entire world space
    root: OctreeNode,

    /// Maximum insertion depth
    insert_depth: u32,
}

impl Octree {
    /// Create a new octree spanning `half_extents` around `center`
    pub fn new(center: DVec3, half_extents: DVec3, insert_depth: u32) -> Self {
        Self {
            root: OctreeNode::new(DAabb::from_center_extents(center, half_extents), 0),
            insert_depth,
        }
    }

    /// World-space bounds spanned by the tree
    pub fn bounds(&self) -> DAabb {
        self.root.bounds
    }

    /// Insert an entry
    ///
    /// Bounds reaching outside the tree land in the root node; queries still
    /// find them, they just skip the hierarchy speed-up.
    pub fn insert(&mut self, id: SpatialId, bounds: DAabb) {
        self.root.insert(OctreeEntry { id, bounds }, self.insert_depth);
    }

    /// Remove an entry by id; `bounds` must be the bounds it was inserted
    /// with, they select the node path to search
    pub fn remove(&mut self, id: SpatialId, bounds: DAabb) -> bool {
        self.root.remove(id, &bounds, self.insert_depth)
    }

    /// Move an entry to new bounds
    pub fn update(&mut self, id: SpatialId, old_bounds: DAabb, new_bounds: DAabb) {
        self.root.remove(id, &old_bounds, self.insert_depth);
        self.insert(id, new_bounds);
    }

    /// Collect all entries whose bounds intersect the query box
    pub fn query_box(&self, query: &DAabb) -> Vec<OctreeEntry> {
        let mut results = Vec::new();
        self.root.query_box(query, &mut results);
        results
    }

    /// Collect all entries whose bounds intersect the query sphere
    pub fn query_sphere(&self, center: DVec3, radius: f64) -> Vec<OctreeEntry> {
        let mut results = Vec::new();
        self.root.query_sphere(center, radius, &mut results);
        results
    }

    /// Collect every entry in the tree
    pub fn visit_all(&self) -> Vec<OctreeEntry> {
        let mut results = Vec::new();
        self.root.visit_all(&mut results);
        results
    }

    /// Total entry count
    pub fn entry_count(&self) -> usize {
        self.root.count_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tree() -> Octree {
        Octree::new(DVec3::zeros(), DVec3::new(100.0, 100.0, 100.0), 4)
    }

    fn small_box(center: DVec3) -> DAabb {
        DAabb::from_center_extents(center, DVec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_octree_basic_insertion() {
        let mut octree = test_tree();
        octree.insert(SpatialId::new(1), small_box(DVec3::new(50.0, 50.0, 50.0)));
        assert_eq!(octree.entry_count(), 1);
    }

    #[test]
    fn test_octree_straddling_entry_stays_findable() {
        let mut octree = test_tree();
        // centered on the root split planes: must not vanish into a child
        let bounds = small_box(DVec3::zeros());
        octree.insert(SpatialId::new(7), bounds);

        let results = octree.query_box(&small_box(DVec3::new(0.5, 0.5, 0.5)));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, SpatialId::new(7));
    }

    #[test]
    fn test_octree_box_query() {
        let mut octree = test_tree();
        octree.insert(SpatialId::new(1), small_box(DVec3::new(10.0, 10.0, 10.0)));
        octree.insert(SpatialId::new(2), small_box(DVec3::new(12.0, 10.0, 10.0)));
        octree.insert(SpatialId::new(3), small_box(DVec3::new(-80.0, 10.0, 10.0)));

        let query = DAabb::from_center_extents(
            DVec3::new(11.0, 10.0, 10.0),
            DVec3::new(5.0, 5.0, 5.0),
        );
        let mut ids: Vec<u64> = octree.query_box(&query).iter().map(|e| e.id.raw()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_octree_sphere_query() {
        let mut octree = test_tree();
        octree.insert(SpatialId::new(1), small_box(DVec3::new(0.0, 0.0, 0.0)));
        octree.insert(SpatialId::new(2), small_box(DVec3::new(5.0, 0.0, 0.0)));
        octree.insert(SpatialId::new(3), small_box(DVec3::new(50.0, 0.0, 0.0)));

        let results = octree.query_sphere(DVec3::zeros(), 10.0);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_octree_remove_and_update() {
        let mut octree = test_tree();
        let a = small_box(DVec3::new(10.0, 10.0, 10.0));
        let b = small_box(DVec3::new(-10.0, -10.0, -10.0));
        octree.insert(SpatialId::new(1), a);

        octree.update(SpatialId::new(1), a, b);
        assert_eq!(octree.entry_count(), 1);
        assert!(octree.query_box(&a).is_empty());
        assert_eq!(octree.query_box(&b).len(), 1);

        assert!(octree.remove(SpatialId::new(1), b));
        assert_eq!(octree.entry_count(), 0);
        assert!(!octree.remove(SpatialId::new(1), b));
    }

    #[test]
    fn test_octree_out_of_bounds_entry_lands_in_root() {
        let mut octree = test_tree();
        let far = small_box(DVec3::new(500.0, 0.0, 0.0));
        octree.insert(SpatialId::new(9), far);
        assert_eq!(octree.entry_count(), 1);
        assert_eq!(octree.query_box(&far).len(), 1);
    }
}
