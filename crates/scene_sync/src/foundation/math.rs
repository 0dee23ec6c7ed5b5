//! Math utilities and types
//!
//! World-space positions and extents use `f64` so very large worlds keep
//! sub-millimeter precision far from the origin; colors and render
//! parameters stay `f32`.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type (render parameters)
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type (render parameters)
pub type Mat4 = Matrix4<f32>;

/// Double-precision 3D vector (world space)
pub type DVec3 = Vector3<f64>;

/// Double-precision 4x4 matrix (world space)
pub type DMat4 = Matrix4<f64>;

/// Double-precision rotation quaternion (world space)
pub type DQuat = Unit<Quaternion<f64>>;

/// RGBA color with `f32` channels
pub type Color = Vector4<f32>;

/// Compose a world matrix from position, orientation and scale
pub fn world_matrix(position: DVec3, orientation: DQuat, scale: DVec3) -> DMat4 {
    let mut m = orientation.to_homogeneous();
    m.prepend_nonuniform_scaling_mut(&scale);
    m.append_translation_mut(&position);
    m
}

/// Build a right-handed view matrix from a camera position and orientation
///
/// The view matrix is the inverse of the camera's world matrix; since the
/// world matrix is a rigid transform the inverse is computed directly from
/// the transposed rotation.
pub fn view_matrix(position: DVec3, orientation: DQuat) -> DMat4 {
    let rotation = orientation.to_rotation_matrix().transpose();
    let translated = rotation * -position;
    let mut m = rotation.to_homogeneous();
    m.append_translation_mut(&translated);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_matrix_translation() {
        let m = world_matrix(
            DVec3::new(1.0, 2.0, 3.0),
            DQuat::identity(),
            DVec3::new(1.0, 1.0, 1.0),
        );
        let p = m.transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, 3.0);
    }

    #[test]
    fn test_view_matrix_inverts_world_matrix() {
        let orientation = DQuat::from_axis_angle(&Vector3::y_axis(), 0.7);
        let position = DVec3::new(5.0, -2.0, 8.5);
        let world = world_matrix(position, orientation, DVec3::new(1.0, 1.0, 1.0));
        let view = view_matrix(position, orientation);
        let identity = view * world;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[(i, j)], expected, epsilon = 1e-10);
            }
        }
    }
}
