//! Resampling pipeline: linear-transform resampling, displacement-grid
//! resampling, and uniform re-gridding.
//!
//! All three paths derive a voxel-to-voxel mapping from the source and
//! target samplings in double precision and drive the interpolation
//! primitive with it. The physical convention enumerates axes X, Y, Z
//! while buffers are stored Z, Y, X; every voxel map is conjugated with
//! the fixed permutation between the two before it reaches a buffer.

use ndarray::{Array3, Array4, ArrayView3};
use tracing::debug;

use crate::affine::{self, xyz_to_zyx};
use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Vec3};
use crate::interp::{self, Order};
use crate::transform::TransformChain;
use crate::volume::{Sampling, Volume};

/// Result of a displacement-grid resampling.
pub struct GridResampled {
    /// The resampled source data, on the destination sampling.
    pub output: Volume,
    /// The displacement field used for the final pass, resampled onto the
    /// destination lattice and scaled to normalized sampling units;
    /// a 4-D vector volume, kept for diagnostics.
    pub field: Volume,
}

fn inverse(m: &Affine) -> Result<Affine> {
    m.try_inverse().ok_or(CoreError::DegenerateAffine)
}

/// Voxel-to-voxel map from a target sampling into a source volume, in
/// buffer (Z,Y,X) coordinates: `P * (V2Wsrc^-1 * X^-1 * V2Wtgt) * P`.
fn voxel_map(src_v2w: &Affine, tgt_v2w: &Affine, xfm: &Affine) -> Result<Affine> {
    let full = inverse(src_v2w)? * inverse(xfm)? * tgt_v2w;
    let p = xyz_to_zyx();
    Ok(p * full * p)
}

fn resample_view(
    src: &ArrayView3<'_, f64>,
    src_v2w: &Affine,
    target: &Sampling,
    xfm: &Affine,
    order: Order,
    fill: f64,
) -> Result<Array3<f64>> {
    let map = voxel_map(src_v2w, &target.voxel_to_world, xfm)?;
    interp::affine_map(src, &map, target.shape, order, fill)
}

/// Resample a volume onto a target sampling through a linear world-to-world
/// transform.
///
/// Covers rigid, similarity and full-affine alignment between two volumes
/// with possibly different sampling. The transform maps source world
/// coordinates to target world coordinates; output voxels pull from
/// `V2Wsrc^-1 * X^-1 * V2Wtgt`.
pub fn resample_linear(
    src: &Volume,
    target: &Sampling,
    xfm: &Affine,
    order: Order,
    fill: f64,
) -> Result<Volume> {
    let view = src.spatial_view()?;
    debug!(
        src_shape = ?src.shape(),
        target_shape = ?target.shape,
        "linear resampling"
    );
    let out = resample_view(&view, src.voxel_to_world(), target, xfm, order, fill)?;
    Volume::from_affine(out.into_dyn(), &target.voxel_to_world)
}

/// Resample a volume through a displacement-grid transform chain.
///
/// Two interpolation passes, deliberately not fused. The displacement grid
/// may be sampled on a different lattice than the destination, so each of
/// its three components is first resampled onto the destination voxel grid
/// through the linear pathway (trilinear, zero fill — the grid's own
/// sampling governs this pass). The resampled displacements are then
/// converted from physical units to the destination's normalized sampling
/// units with the per-axis factor `2/length / step`, the identity sampling
/// map is added, and the source is pulled through the resulting
/// deformation field with the caller's interpolation order.
///
/// The output keeps the source volume's sampling. A chain whose grid is
/// flagged inverted cannot be evaluated and is rejected.
pub fn resample_grid(
    src: &Volume,
    chain: &TransformChain,
    order: Order,
    fill: f64,
) -> Result<GridResampled> {
    let (grid, invert) = chain.grid_only()?;
    if invert {
        return Err(CoreError::unsupported(
            "resampling through an inverted displacement grid",
        ));
    }
    if grid.vector_length() != Some(3) {
        return Err(CoreError::compose(
            "displacement grid must carry a 3-component vector axis",
        ));
    }

    let dst = Sampling::like(src);
    let view = src.spatial_view()?;
    let (lz, ly, lx) = (dst.shape[0], dst.shape[1], dst.shape[2]);

    // Pass 1: bring the grid onto the destination lattice.
    let identity = Affine::identity();
    let mut components: Vec<Array3<f64>> = Vec::with_capacity(3);
    for c in 0..3 {
        let comp = grid.component(c)?;
        components.push(resample_view(
            &comp,
            grid.voxel_to_world(),
            &dst,
            &identity,
            Order::Linear,
            0.0,
        )?);
    }

    // Physical units -> normalized sampling units of the destination.
    let (_, step, _) = affine::decompose(&dst.voxel_to_world)?;
    let lens = Vec3::new(lx as f64, ly as f64, lz as f64);
    let factor = Vec3::new(
        2.0 / lens[0] / step[0],
        2.0 / lens[1] / step[1],
        2.0 / lens[2] / step[2],
    );
    debug!(?step, ?factor, "scaling displacements to sampling units");

    let mut field = Array4::<f64>::zeros([lz, ly, lx, 3]);
    for ((z, y, x, c), v) in field.indexed_iter_mut() {
        let idx = match c {
            0 => x,
            1 => y,
            _ => z,
        } as f64;
        let identity_term = (2.0 * idx + 1.0) / lens[c] - 1.0;
        *v = components[c][(z, y, x)] * factor[c] + identity_term;
    }

    let out = interp::displacement_map(&view, &field.view(), order, fill)?;
    let output = Volume::from_affine(out.into_dyn(), &dst.voxel_to_world)?;

    // Keep the scaled field (without the identity term) for diagnostics.
    let mut dump = field;
    for ((z, y, x, c), v) in dump.indexed_iter_mut() {
        let idx = match c {
            0 => x,
            1 => y,
            _ => z,
        } as f64;
        *v -= (2.0 * idx + 1.0) / lens[c] - 1.0;
    }
    let field = Volume::from_affine(dump.into_dyn(), &dst.voxel_to_world)?;

    Ok(GridResampled { output, field })
}

/// Re-grid a volume to a caller-specified isotropic step covering the same
/// physical extent, half-voxel-centred.
///
/// Only re-grids when some axis step differs from the target step by more
/// than `tolerance`; within tolerance the input is returned unchanged and
/// no resampling happens. The tolerance is a performance guard, not a
/// correctness threshold, so loose defaults are fine.
pub fn uniformize(
    src: &Volume,
    target_step: f64,
    tolerance: f64,
    order: Order,
    fill: f64,
) -> Result<Volume> {
    let v2w = *src.voxel_to_world();
    let (start, step, dir_cos) = affine::decompose(&v2w)?;

    if (0..3).all(|i| (step[i] - target_step).abs() <= tolerance) {
        debug!(?step, target_step, "sampling already uniform, skipping");
        return Ok(src.clone());
    }
    if step.iter().any(|s| *s <= 0.0) {
        return Err(CoreError::unsupported(
            "uniform re-gridding of a volume with non-positive steps",
        ));
    }

    let shape = src.spatial_shape();
    let step_zyx = [step[2], step[1], step[0]];
    let mut new_shape = [0usize; 3];
    for k in 0..3 {
        new_shape[k] = (shape[k] as f64 * step_zyx[k] / target_step).ceil() as usize;
    }

    // Voxel centres shift by half the old and half the new step.
    let new_start = start - step * 0.5 + Vec3::from_element(target_step * 0.5);
    let new_v2w = affine::compose(
        &new_start,
        &Vec3::from_element(target_step),
        &dir_cos,
    );

    debug!(?shape, ?new_shape, "uniform re-gridding");
    let target = Sampling {
        shape: new_shape,
        voxel_to_world: new_v2w,
    };
    resample_linear(src, &target, &Affine::identity(), order, fill)
}
