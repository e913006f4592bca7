//! Point evaluation of displacement grids.

use crate::error::{CoreError, Result};
use crate::geometry::{apply_affine, Vec3};
use crate::interp::{self, Order};
use crate::volume::Volume;

/// Displace a world point by a displacement grid.
///
/// The queried point is mapped into the grid's own voxel space through its
/// dimension records, the three displacement components are sampled there
/// with trilinear interpolation (zero displacement outside the grid), and
/// the offset is added to the point.
pub fn displace_point(grid: &Volume, p: &Vec3) -> Result<Vec3> {
    if grid.vector_length() != Some(3) {
        return Err(CoreError::compose(
            "displacement grid must carry a 3-component vector axis",
        ));
    }
    let w2v = grid
        .voxel_to_world()
        .try_inverse()
        .ok_or(CoreError::DegenerateAffine)?;
    let v = apply_affine(&w2v, p);
    let coord = [v[2], v[1], v[0]];

    let mut offset = Vec3::zeros();
    for c in 0..3 {
        let component = grid.component(c)?;
        offset[c] = interp::sample(&component, coord, Order::Linear, 0.0);
    }
    Ok(p + offset)
}
