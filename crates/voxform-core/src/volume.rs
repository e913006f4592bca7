//! Owned volume buffer with its sampling description.

use ndarray::{ArrayD, ArrayView3, ArrayViewD, Axis, Ix3};

use crate::dims::{self, AxisKind, Dimension};
use crate::error::{CoreError, Result};
use crate::geometry::Affine;

/// An owned N-dimensional buffer together with its dimension records and
/// the derived voxel-to-world affine.
///
/// The buffer is always held in standard order: axes run Z, Y, X from
/// slowest to fastest, with an optional trailing vector axis. The
/// dimension list is kept in standard order as well (Vector, X, Y, Z,
/// fastest-varying first), i.e. the reverse of the buffer axes.
#[derive(Debug, Clone)]
pub struct Volume {
    data: ArrayD<f64>,
    dims: Vec<Dimension>,
    voxel_to_world: Affine,
}

/// A target sampling grid: a spatial shape plus its voxel-to-world affine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Spatial buffer shape, `[Z, Y, X]`.
    pub shape: [usize; 3],
    pub voxel_to_world: Affine,
}

impl Sampling {
    /// The sampling of an existing volume.
    pub fn like(volume: &Volume) -> Self {
        Self {
            shape: volume.spatial_shape(),
            voxel_to_world: *volume.voxel_to_world(),
        }
    }
}

impl Volume {
    /// Wrap a standard-order buffer with its dimension records.
    ///
    /// The records may be given in any order; they are sorted into
    /// standard order and validated against the buffer shape.
    pub fn new(data: ArrayD<f64>, dims: Vec<Dimension>) -> Result<Self> {
        if data.ndim() != 3 && data.ndim() != 4 {
            return Err(CoreError::UnsupportedRank(data.ndim()));
        }
        let dims = dims::standard_order(&dims);
        if data.ndim() == 4 && dims.first().map(|d| d.kind) != Some(AxisKind::Vector) {
            return Err(CoreError::unsupported(
                "4-dimensional volumes must carry a vector axis",
            ));
        }
        let expected = dims::buffer_shape(&dims);
        if expected != data.shape() {
            return Err(CoreError::ShapeMismatch {
                expected,
                actual: data.shape().to_vec(),
            });
        }
        let voxel_to_world = dims::dims_to_affine(&dims)?;
        Ok(Self {
            data,
            dims,
            voxel_to_world,
        })
    }

    /// Wrap a standard-order buffer, deriving dimension records from an
    /// affine. Rank outside {3, 4} is rejected.
    pub fn from_affine(data: ArrayD<f64>, affine: &Affine) -> Result<Self> {
        let dims = dims::affine_to_dims(affine, data.shape())?;
        Self::new(data, dims)
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }

    /// Dimension records in standard order (fastest-varying first).
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn voxel_to_world(&self) -> &Affine {
        &self.voxel_to_world
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Spatial part of the buffer shape, `[Z, Y, X]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    /// Length of the trailing vector axis, if the volume has one.
    pub fn vector_length(&self) -> Option<usize> {
        self.dims
            .iter()
            .find(|d| d.kind == AxisKind::Vector)
            .map(|d| d.length)
    }

    /// The spatial 3-D view of component `c` of a vector volume.
    pub fn component(&self, c: usize) -> Result<ArrayView3<'_, f64>> {
        if self.data.ndim() != 4 {
            return Err(CoreError::UnsupportedRank(self.data.ndim()));
        }
        let view: ArrayViewD<'_, f64> = self.data.index_axis(Axis(3), c);
        Ok(view
            .into_dimensionality::<Ix3>()
            .expect("component view is 3-D"))
    }

    /// The spatial 3-D view of a scalar volume.
    pub fn spatial_view(&self) -> Result<ArrayView3<'_, f64>> {
        if self.data.ndim() != 3 {
            return Err(CoreError::UnsupportedRank(self.data.ndim()));
        }
        Ok(self
            .data
            .view()
            .into_dimensionality::<Ix3>()
            .expect("scalar volume is 3-D"))
    }
}
