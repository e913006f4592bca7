//! Pure affine algebra: decomposition into start/step/rotation, the
//! inverse composition, and synthetic matrix builders.
//!
//! All arithmetic is double precision regardless of how the volume's
//! samples are stored.

use nalgebra::SVD;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Rotation, Vec3};

const DEGENERATE_EPS: f64 = 1e-12;

/// Split a voxel-to-world affine into per-axis start, step and a direction
/// cosine matrix.
///
/// The singular value decomposition of the linear block yields the
/// orthogonal factor `U * V^T` as the rotation (the singular values carry
/// only scale and are discarded); the step is recovered as the diagonal of
/// `block * rotation^-1` and the start as the translation projected
/// through `rotation^-1`. The determinant sign of the block is preserved,
/// so decomposition never introduces axis flips of its own.
///
/// Shear is not modeled separately: only the orthogonal factor and the
/// diagonal of the symmetric factor survive, so sheared affines do not
/// round-trip exactly through [`compose`]. That is a known approximation
/// of this representation, not an error. Shear-free affines round-trip to
/// floating-point tolerance.
pub fn decompose(affine: &Affine) -> Result<(Vec3, Vec3, Rotation)> {
    let block: Rotation = affine.fixed_view::<3, 3>(0, 0).into_owned();
    if block.determinant().abs() < DEGENERATE_EPS {
        return Err(CoreError::DegenerateAffine);
    }

    let svd = SVD::new(block, true, true);
    let u = svd.u.ok_or(CoreError::DegenerateAffine)?;
    let v_t = svd.v_t.ok_or(CoreError::DegenerateAffine)?;
    let dir_cos = u * v_t;

    let inv = dir_cos.try_inverse().ok_or(CoreError::DegenerateAffine)?;
    let scaled = block * inv;
    let step = Vec3::new(scaled[(0, 0)], scaled[(1, 1)], scaled[(2, 2)]);

    let t = Vec3::new(affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]);
    let start = inv.transpose() * t;

    Ok((start, step, dir_cos))
}

/// Rebuild a voxel-to-world affine from start, step and direction cosines.
///
/// `block = diag(step) * rotation`, `translation = rotation^T * start`.
/// Inverse of [`decompose`] up to floating point for shear-free affines.
pub fn compose(start: &Vec3, step: &Vec3, dir_cos: &Rotation) -> Affine {
    let mut affine = Affine::identity();
    for i in 0..3 {
        for j in 0..3 {
            affine[(i, j)] = step[i] * dir_cos[(i, j)];
        }
    }
    let t = dir_cos.transpose() * start;
    affine[(0, 3)] = t[0];
    affine[(1, 3)] = t[1];
    affine[(2, 3)] = t[2];
    affine
}

/// Rotation about X, then Y, then Z, as a homogeneous matrix
/// `Rx(rot.x) * Ry(rot.y) * Rz(rot.z)`.
pub fn rotation_matrix(rot: &Vec3) -> Affine {
    let (sx, cx) = rot[0].sin_cos();
    let mut affine_x = Affine::identity();
    affine_x[(1, 1)] = cx;
    affine_x[(1, 2)] = -sx;
    affine_x[(2, 1)] = sx;
    affine_x[(2, 2)] = cx;

    let (sy, cy) = rot[1].sin_cos();
    let mut affine_y = Affine::identity();
    affine_y[(0, 0)] = cy;
    affine_y[(0, 2)] = sy;
    affine_y[(2, 0)] = -sy;
    affine_y[(2, 2)] = cy;

    let (sz, cz) = rot[2].sin_cos();
    let mut affine_z = Affine::identity();
    affine_z[(0, 0)] = cz;
    affine_z[(0, 1)] = -sz;
    affine_z[(1, 0)] = sz;
    affine_z[(1, 1)] = cz;

    affine_x * affine_y * affine_z
}

/// Per-axis scaling as a homogeneous matrix.
pub fn scale_matrix(scale: &Vec3) -> Affine {
    let mut affine = Affine::identity();
    affine[(0, 0)] = scale[0];
    affine[(1, 1)] = scale[1];
    affine[(2, 2)] = scale[2];
    affine
}

/// Translation as a homogeneous matrix.
pub fn translation_matrix(shift: &Vec3) -> Affine {
    let mut affine = Affine::identity();
    affine[(0, 3)] = shift[0];
    affine[(1, 3)] = shift[1];
    affine[(2, 3)] = shift[2];
    affine
}

/// General shear as a homogeneous matrix; the six coefficients fill the
/// off-diagonal positions `(0,1) (0,2) (1,0) (1,2) (2,0) (2,1)` in order.
pub fn shear_matrix(shear: &[f64; 6]) -> Affine {
    let mut affine = Affine::identity();
    affine[(0, 1)] = shear[0];
    affine[(0, 2)] = shear[1];
    affine[(1, 0)] = shear[2];
    affine[(1, 2)] = shear[3];
    affine[(2, 0)] = shear[4];
    affine[(2, 1)] = shear[5];
    affine
}

/// Build a transform from explicit rotation angles, scale, shift and shear,
/// composed as `T * Shear * Scale * Rot`.
pub fn transform_from_parts(rot: &Vec3, scale: &Vec3, shift: &Vec3, shear: &[f64; 6]) -> Affine {
    translation_matrix(shift) * shear_matrix(shear) * scale_matrix(scale) * rotation_matrix(rot)
}

/// Centred parameterization of a linear transform, as used in transform
/// files: `M(x) = (Shear * Scale * Rot)(x - center) + center + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParameters {
    pub center: [f64; 3],
    pub translations: [f64; 3],
    pub scales: [f64; 3],
    /// Lower-triangular shears: y += s0*x, z += s1*x + s2*y.
    pub shears: [f64; 3],
    /// Rotation angles about X, Y, Z in radians.
    pub rotations: [f64; 3],
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            translations: [0.0; 3],
            scales: [1.0; 3],
            shears: [0.0; 3],
            rotations: [0.0; 3],
        }
    }
}

impl TransformParameters {
    /// The 4x4 matrix this parameter set describes.
    pub fn to_matrix(&self) -> Affine {
        let center = Vec3::from(self.center);
        let linear = transform_from_parts(
            &Vec3::from(self.rotations),
            &Vec3::from(self.scales),
            &Vec3::zeros(),
            &[0.0, 0.0, self.shears[0], 0.0, self.shears[1], self.shears[2]],
        );
        translation_matrix(&(center + Vec3::from(self.translations)))
            * linear
            * translation_matrix(&-center)
    }

    /// Recover parameters from a matrix around the given center.
    ///
    /// Only shear-free matrices are supported; a matrix whose decomposed
    /// rotation is not orthonormal is rejected rather than approximated.
    pub fn from_matrix(matrix: &Affine, center: [f64; 3]) -> Result<Self> {
        let block: Rotation = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let (_, step, dir_cos) = decompose(matrix)?;

        let ortho_err = (dir_cos * dir_cos.transpose() - Rotation::identity()).norm();
        if ortho_err > 1e-6 {
            return Err(CoreError::unsupported(
                "parameter extraction from a sheared matrix",
            ));
        }

        // With M(x) = A(x - c) + c + t, the stored translation column is
        // t + c - A*c.
        let c = Vec3::from(center);
        let m_t = Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);
        let t = m_t + block * c - c;

        // dir_cos = Rx(a) * Ry(b) * Rz(g)
        let b = dir_cos[(0, 2)].clamp(-1.0, 1.0).asin();
        let g = (-dir_cos[(0, 1)]).atan2(dir_cos[(0, 0)]);
        let a = (-dir_cos[(1, 2)]).atan2(dir_cos[(2, 2)]);

        Ok(Self {
            center,
            translations: [t[0], t[1], t[2]],
            scales: [step[0], step[1], step[2]],
            shears: [0.0; 3],
            rotations: [a, b, g],
        })
    }
}

/// Map voxel coordinates (X,Y,Z order) of a standard-order buffer with the
/// given `[Z, Y, X]` shape into the half-voxel-centred normalized sampling
/// box `[-1, 1]` per axis.
pub fn normalized_sampling_matrix(shape: &[usize]) -> Affine {
    let (lx, ly, lz) = (shape[2] as f64, shape[1] as f64, shape[0] as f64);
    let mut v2p = Affine::identity();
    v2p[(0, 0)] = 2.0 / lx;
    v2p[(1, 1)] = 2.0 / ly;
    v2p[(2, 2)] = 2.0 / lz;
    v2p[(0, 3)] = 1.0 / lx - 1.0;
    v2p[(1, 3)] = 1.0 / ly - 1.0;
    v2p[(2, 3)] = 1.0 / lz - 1.0;
    v2p
}

/// The fixed permutation conjugating between the physical X,Y,Z convention
/// and the Z,Y,X storage convention. Self-inverse.
pub fn xyz_to_zyx() -> Affine {
    let mut p = Affine::zeros();
    p[(0, 2)] = 1.0;
    p[(1, 1)] = 1.0;
    p[(2, 0)] = 1.0;
    p[(3, 3)] = 1.0;
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::frobenius_distance;

    #[test]
    fn test_compose_decompose_round_trip() {
        let start = Vec3::new(-12.0, 4.5, 7.25);
        let step = Vec3::new(1.5, -2.0, 2.5);
        let rot3 = rotation_matrix(&Vec3::new(0.3, -0.2, 0.7));
        let dir_cos: Rotation = rot3.fixed_view::<3, 3>(0, 0).into_owned();

        let affine = compose(&start, &step, &dir_cos);
        let (start2, step2, dir2) = decompose(&affine).unwrap();
        let affine2 = compose(&start2, &step2, &dir2);

        assert!(frobenius_distance(&affine, &affine2) < 1e-8);
    }

    #[test]
    fn test_decompose_identity() {
        let (start, step, dir_cos) = decompose(&Affine::identity()).unwrap();
        assert!(start.norm() < 1e-12);
        assert!((step - Vec3::new(1.0, 1.0, 1.0)).norm() < 1e-12);
        assert!((dir_cos - Rotation::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_decompose_rejects_singular_block() {
        let mut affine = Affine::identity();
        affine[(1, 1)] = 0.0;
        assert!(matches!(
            decompose(&affine),
            Err(CoreError::DegenerateAffine)
        ));
    }

    #[test]
    fn test_decompose_preserves_determinant_sign() {
        let affine = scale_matrix(&Vec3::new(2.0, 3.0, -4.0));
        let (_, step, dir_cos) = decompose(&affine).unwrap();
        let sign = dir_cos.determinant().signum() * step[0] * step[1] * step[2];
        assert!(sign < 0.0);
        // The recomposed matrix keeps the flip.
        let back = compose(&decompose(&affine).unwrap().0, &step, &dir_cos);
        assert!(frobenius_distance(&affine, &back) < 1e-8);
    }

    #[test]
    fn test_transform_from_parts_order() {
        // With only scale and shift, T * Scale applies scale first.
        let m = transform_from_parts(
            &Vec3::zeros(),
            &Vec3::new(2.0, 3.0, 4.0),
            &Vec3::new(1.0, 1.0, 1.0),
            &[0.0; 6],
        );
        let p = crate::geometry::apply_affine(&m, &Vec3::new(1.0, 1.0, 1.0));
        assert!((p - Vec3::new(3.0, 4.0, 5.0)).norm() < 1e-12);
    }

    #[test]
    fn test_parameters_scenario_point() {
        let par = TransformParameters {
            center: [2.21, -3.765, 4.09],
            translations: [1.23, 6.4, -7.8],
            scales: [0.2, 4.3, -3.0],
            ..Default::default()
        };
        let m = par.to_matrix();
        let p = crate::geometry::apply_affine(&m, &Vec3::new(6.68, 3.14, 7.00));
        assert!((p[0] - 4.334).abs() < 1e-8);
        assert!((p[1] - 32.3265).abs() < 1e-8);
        assert!((p[2] - (-12.44)).abs() < 1e-8);

        let inv = m.try_inverse().unwrap();
        let q = crate::geometry::apply_affine(&inv, &Vec3::new(6.68, 3.14, 7.00));
        assert!((q[0] - 18.41).abs() < 1e-6);
        assert!((q[1] - (-3.64756)).abs() < 1e-4);
        assert!((q[2] - 0.52).abs() < 1e-6);
    }

    #[test]
    fn test_parameter_extraction_round_trip() {
        let par = TransformParameters {
            center: [1.0, -2.0, 3.0],
            translations: [4.0, 5.0, -6.0],
            scales: [1.5, 2.0, 2.5],
            rotations: [0.2, -0.4, 0.6],
            ..Default::default()
        };
        let m = par.to_matrix();
        let back = TransformParameters::from_matrix(&m, par.center).unwrap();
        for i in 0..3 {
            assert!((par.translations[i] - back.translations[i]).abs() < 1e-9);
            assert!((par.scales[i] - back.scales[i]).abs() < 1e-9);
            assert!((par.rotations[i] - back.rotations[i]).abs() < 1e-9);
        }
        assert!(frobenius_distance(&m, &back.to_matrix()) < 1e-9);
    }

    #[test]
    fn test_normalized_sampling_matrix_centers() {
        // A 4-voxel axis: voxel centres sit at -1 + (2i+1)/len.
        let v2p = normalized_sampling_matrix(&[2, 3, 4]);
        let p = crate::geometry::apply_affine(&v2p, &Vec3::new(0.0, 0.0, 0.0));
        assert!((p[0] - (1.0 / 4.0 - 1.0)).abs() < 1e-12);
        assert!((p[1] - (1.0 / 3.0 - 1.0)).abs() < 1e-12);
        assert!((p[2] - (1.0 / 2.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_xyz_to_zyx_self_inverse() {
        let p = xyz_to_zyx();
        assert!(frobenius_distance(&(p * p), &Affine::identity()) < 1e-12);
    }
}
