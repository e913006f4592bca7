//! Grid interpolation primitive.
//!
//! Output-driven samplers over 3-D buffers: every output voxel is mapped
//! to a continuous source coordinate and the source is sampled there with
//! the requested kernel, falling back to a constant fill value outside the
//! buffer. The inner loop over output voxels is data-parallel and
//! deterministic.

use ndarray::{Array3, ArrayView3, ArrayView4, Zip};

use crate::error::{CoreError, Result};
use crate::geometry::Affine;

/// Interpolation kernel selected by spline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Order 0: nearest neighbour.
    Nearest,
    /// Order 1: trilinear.
    Linear,
    /// Order 3: cubic (Catmull-Rom).
    Cubic,
}

impl Order {
    /// Map a numeric spline order to a kernel.
    pub fn from_spline_order(order: usize) -> Result<Self> {
        match order {
            0 => Ok(Self::Nearest),
            1 => Ok(Self::Linear),
            3 => Ok(Self::Cubic),
            other => Err(CoreError::unsupported(format!(
                "interpolation order {other}, supported orders are 0, 1 and 3"
            ))),
        }
    }
}

/// Sample a 3-D buffer at a continuous `[Z, Y, X]` coordinate.
pub fn sample(input: &ArrayView3<'_, f64>, coord: [f64; 3], order: Order, fill: f64) -> f64 {
    match order {
        Order::Nearest => sample_nearest(input, coord, fill),
        Order::Linear => sample_linear(input, coord, fill),
        Order::Cubic => sample_cubic(input, coord, fill),
    }
}

fn at(input: &ArrayView3<'_, f64>, z: isize, y: isize, x: isize, fill: f64) -> f64 {
    let s = input.shape();
    if z < 0 || y < 0 || x < 0 || z as usize >= s[0] || y as usize >= s[1] || x as usize >= s[2] {
        fill
    } else {
        input[(z as usize, y as usize, x as usize)]
    }
}

fn sample_nearest(input: &ArrayView3<'_, f64>, coord: [f64; 3], fill: f64) -> f64 {
    at(
        input,
        coord[0].round() as isize,
        coord[1].round() as isize,
        coord[2].round() as isize,
        fill,
    )
}

fn sample_linear(input: &ArrayView3<'_, f64>, coord: [f64; 3], fill: f64) -> f64 {
    let base = coord.map(|c| c.floor());
    let frac = [
        coord[0] - base[0],
        coord[1] - base[1],
        coord[2] - base[2],
    ];
    let (z0, y0, x0) = (base[0] as isize, base[1] as isize, base[2] as isize);

    let mut acc = 0.0;
    for dz in 0..2 {
        let wz = if dz == 0 { 1.0 - frac[0] } else { frac[0] };
        if wz == 0.0 {
            continue;
        }
        for dy in 0..2 {
            let wy = if dy == 0 { 1.0 - frac[1] } else { frac[1] };
            if wy == 0.0 {
                continue;
            }
            for dx in 0..2 {
                let wx = if dx == 0 { 1.0 - frac[2] } else { frac[2] };
                if wx == 0.0 {
                    continue;
                }
                acc += wz * wy * wx * at(input, z0 + dz, y0 + dy, x0 + dx, fill);
            }
        }
    }
    acc
}

/// Catmull-Rom weights for taps at offsets -1, 0, 1, 2.
fn cubic_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

fn sample_cubic(input: &ArrayView3<'_, f64>, coord: [f64; 3], fill: f64) -> f64 {
    let base = coord.map(|c| c.floor());
    let wz = cubic_weights(coord[0] - base[0]);
    let wy = cubic_weights(coord[1] - base[1]);
    let wx = cubic_weights(coord[2] - base[2]);
    let (z0, y0, x0) = (base[0] as isize, base[1] as isize, base[2] as isize);

    let mut acc = 0.0;
    for (iz, wz) in wz.iter().enumerate() {
        if *wz == 0.0 {
            continue;
        }
        for (iy, wy) in wy.iter().enumerate() {
            if *wy == 0.0 {
                continue;
            }
            for (ix, wx) in wx.iter().enumerate() {
                if *wx == 0.0 {
                    continue;
                }
                let v = at(
                    input,
                    z0 + iz as isize - 1,
                    y0 + iy as isize - 1,
                    x0 + ix as isize - 1,
                    fill,
                );
                acc += wz * wy * wx * v;
            }
        }
    }
    acc
}

/// Resample a 3-D buffer through a voxel-to-voxel affine.
///
/// The matrix maps *output* `[Z, Y, X]` voxel coordinates to input voxel
/// coordinates; each output voxel samples the input at the mapped
/// position.
pub fn affine_map(
    input: &ArrayView3<'_, f64>,
    matrix: &Affine,
    output_shape: [usize; 3],
    order: Order,
    fill: f64,
) -> Result<Array3<f64>> {
    let mut out = Array3::<f64>::zeros(output_shape);
    let m = *matrix;
    Zip::indexed(&mut out).par_for_each(|(z, y, x), v| {
        let sz = m[(0, 0)] * z as f64 + m[(0, 1)] * y as f64 + m[(0, 2)] * x as f64 + m[(0, 3)];
        let sy = m[(1, 0)] * z as f64 + m[(1, 1)] * y as f64 + m[(1, 2)] * x as f64 + m[(1, 3)];
        let sx = m[(2, 0)] * z as f64 + m[(2, 1)] * y as f64 + m[(2, 2)] * x as f64 + m[(2, 3)];
        *v = sample(input, [sz, sy, sx], order, fill);
    });
    Ok(out)
}

/// Resample a 3-D buffer through a dense deformation field in normalized
/// sampling coordinates.
///
/// `field` has shape `[Z, Y, X, 3]`; the last axis holds the target
/// position of each output voxel in the input's `[-1, 1]` normalized
/// sampling space, components in X, Y, Z order. Positions are converted
/// to voxel coordinates with the half-voxel-centred convention before
/// sampling.
pub fn displacement_map(
    input: &ArrayView3<'_, f64>,
    field: &ArrayView4<'_, f64>,
    order: Order,
    fill: f64,
) -> Result<Array3<f64>> {
    let fs = field.shape();
    if fs[3] != 3 {
        return Err(CoreError::ShapeMismatch {
            expected: vec![fs[0], fs[1], fs[2], 3],
            actual: fs.to_vec(),
        });
    }
    let s = input.shape();
    let (lz, ly, lx) = (s[0] as f64, s[1] as f64, s[2] as f64);

    let mut out = Array3::<f64>::zeros([fs[0], fs[1], fs[2]]);
    Zip::indexed(&mut out).par_for_each(|(z, y, x), v| {
        let px = field[(z, y, x, 0)];
        let py = field[(z, y, x, 1)];
        let pz = field[(z, y, x, 2)];
        // Inverse of the normalized sampling map p = (2v + 1)/len - 1.
        let vx = ((px + 1.0) * lx - 1.0) / 2.0;
        let vy = ((py + 1.0) * ly - 1.0) / 2.0;
        let vz = ((pz + 1.0) * lz - 1.0) / 2.0;
        *v = sample(input, [vz, vy, vx], order, fill);
    });
    Ok(out)
}
