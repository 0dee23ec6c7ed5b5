//! Shared scene types: bounding volumes and layer masks

use crate::foundation::math::DVec3;

/// Double-precision axis-aligned bounding box for world-space queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DAabb {
    /// Minimum corner of the bounding box
    pub min: DVec3,
    /// Maximum corner of the bounding box
    pub max: DVec3,
}

impl DAabb {
    /// Create a new AABB from min and max points
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: DVec3, extents: DVec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: DVec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another AABB
    pub fn contains(&self, other: &DAabb) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y &&
        other.min.z >= self.min.z && other.max.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &DAabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Transform this AABB by a matrix, producing the enclosing AABB
    ///
    /// Uses the center/extents form with the component-wise absolute matrix,
    /// which encloses all eight transformed corners without enumerating them.
    pub fn transformed(&self, matrix: &crate::foundation::math::DMat4) -> DAabb {
        let center = self.center();
        let extents = self.extents();

        let new_center = matrix.transform_point(&nalgebra::Point3::from(center)).coords;
        let mut new_extents = DVec3::zeros();
        for row in 0..3 {
            new_extents[row] = matrix[(row, 0)].abs() * extents.x
                + matrix[(row, 1)].abs() * extents.y
                + matrix[(row, 2)].abs() * extents.z;
        }

        DAabb::from_center_extents(new_center, new_extents)
    }

    /// Check if a sphere intersects this AABB
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        let closest = DVec3::new(
            center.x.clamp(self.min.x, self.max.x),
            center.y.clamp(self.min.y, self.max.y),
            center.z.clamp(self.min.z, self.max.z),
        );
        (closest - center).norm_squared() <= radius * radius
    }
}

/// Bitmask assigning scene objects to layers
///
/// Cameras and lights carry a mask as well; an object is considered by a
/// consumer when the masks share at least one bit. An empty mask matches
/// everything, which keeps single-layer scenes zero-configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerMask(pub u64);

impl LayerMask {
    /// Mask with every layer set
    pub const ALL: Self = Self(u64::MAX);

    /// Mask with a single layer bit set
    pub fn layer(bit: u32) -> Self {
        Self(1u64 << bit)
    }

    /// True if no layer bit is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if the masks share a bit, or either mask is empty
    pub fn matches(&self, other: Self) -> bool {
        self.is_empty() || other.is_empty() || (self.0 & other.0) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_center_extents() {
        let aabb = DAabb::new(DVec3::new(-2.0, 0.0, 2.0), DVec3::new(2.0, 4.0, 6.0));
        assert_eq!(aabb.center(), DVec3::new(0.0, 2.0, 4.0));
        assert_eq!(aabb.extents(), DVec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_aabb_contains() {
        let outer = DAabb::from_center_extents(DVec3::zeros(), DVec3::new(10.0, 10.0, 10.0));
        let inner = DAabb::from_center_extents(DVec3::new(1.0, 1.0, 1.0), DVec3::new(2.0, 2.0, 2.0));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_aabb_sphere_intersection() {
        let aabb = DAabb::from_center_extents(DVec3::zeros(), DVec3::new(1.0, 1.0, 1.0));
        assert!(aabb.intersects_sphere(DVec3::new(1.5, 0.0, 0.0), 0.75));
        assert!(!aabb.intersects_sphere(DVec3::new(3.0, 0.0, 0.0), 0.5));
    }

    #[test]
    fn test_layer_mask_matching() {
        let a = LayerMask::layer(0);
        let b = LayerMask::layer(1);
        assert!(!a.matches(b));
        assert!(a.matches(LayerMask(0b11)));
        // empty masks match everything
        assert!(LayerMask::default().matches(a));
        assert!(a.matches(LayerMask::default()));
    }
}
