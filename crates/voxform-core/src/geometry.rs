//! Shared linear-algebra type aliases.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// 4x4 homogeneous matrix mapping voxel (X,Y,Z) coordinates to world space.
pub type Affine = Matrix4<f64>;
/// 3x3 rotation / direction-cosine matrix (row i = axis i in world space).
pub type Rotation = Matrix3<f64>;
/// 3-component world or voxel coordinate.
pub type Vec3 = Vector3<f64>;

/// Frobenius distance between two affine matrices.
pub fn frobenius_distance(a: &Affine, b: &Affine) -> f64 {
    (a - b).norm()
}

/// Apply an affine to a 3-D point (homogeneous divide is not needed, the
/// bottom row is always `[0,0,0,1]` for the matrices handled here).
pub fn apply_affine(m: &Affine, p: &Vec3) -> Vec3 {
    let x = m.fixed_view::<3, 3>(0, 0) * p + m.fixed_view::<3, 1>(0, 3);
    Vec3::new(x[0], x[1], x[2])
}
