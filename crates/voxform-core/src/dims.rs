//! Per-axis sampling records and their conversion to and from the
//! voxel-to-world affine matrix.
//!
//! A volume's geometry is described by one [`Dimension`] per axis. Spatial
//! axes carry a start (world offset along the axis), a step (sampling
//! interval) and optionally a direction cosine; the non-spatial vector and
//! time axes carry only a length. Dimension lists appear either in the
//! file's native order or in *standard order* — Vector, X, Y, Z, Time
//! (fastest-varying first) — and the in-memory buffer shape is always the
//! reverse of the list.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Rotation, Vec3};

/// Axis identity of a stored dimension.
///
/// The discriminants are the fixed small-integer ids used for axis
/// identification, so a dimension list can be matched to physical axes
/// regardless of its stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Unknown = 0,
    X = 1,
    Y = 2,
    Z = 3,
    Time = 4,
    Vector = 5,
}

impl AxisKind {
    /// Numeric axis id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Axis kind for a numeric id, if it names one.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Unknown),
            1 => Some(Self::X),
            2 => Some(Self::Y),
            3 => Some(Self::Z),
            4 => Some(Self::Time),
            5 => Some(Self::Vector),
            _ => None,
        }
    }

    /// Index of this axis among the spatial axes (X=0, Y=1, Z=2).
    pub fn spatial_index(self) -> Option<usize> {
        match self {
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
            _ => None,
        }
    }

    /// Position of this axis in standard order (Vector, X, Y, Z, Time,
    /// fastest-varying first).
    pub fn standard_position(self) -> usize {
        match self {
            Self::Vector => 0,
            Self::X => 1,
            Self::Y => 2,
            Self::Z => 3,
            Self::Time => 4,
            Self::Unknown => 5,
        }
    }

    /// Standard basis vector for a spatial axis.
    pub fn basis_vector(self) -> Option<Vec3> {
        let i = self.spatial_index()?;
        let mut v = Vec3::zeros();
        v[i] = 1.0;
        Some(v)
    }
}

/// Sampling description of a single stored axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub kind: AxisKind,
    pub length: usize,
    pub start: f64,
    pub step: f64,
    /// Orientation of the axis in world space. `None` means the standard
    /// basis vector for the axis kind. Must be a unit vector when present.
    pub direction: Option<[f64; 3]>,
}

impl Dimension {
    /// Spatial axis without an explicit direction cosine.
    pub fn spatial(kind: AxisKind, length: usize, start: f64, step: f64) -> Self {
        Self {
            kind,
            length,
            start,
            step,
            direction: None,
        }
    }

    /// Spatial axis with an explicit direction cosine.
    pub fn with_direction(
        kind: AxisKind,
        length: usize,
        start: f64,
        step: f64,
        direction: [f64; 3],
    ) -> Self {
        Self {
            kind,
            length,
            start,
            step,
            direction: Some(direction),
        }
    }

    /// Vector (component) axis of the given length.
    pub fn vector(length: usize) -> Self {
        Self {
            kind: AxisKind::Vector,
            length,
            start: 0.0,
            step: 1.0,
            direction: None,
        }
    }

    /// Time axis of the given length.
    pub fn time(length: usize, start: f64, step: f64) -> Self {
        Self {
            kind: AxisKind::Time,
            length,
            start,
            step,
            direction: None,
        }
    }

    /// The direction cosine, falling back to the standard basis vector of
    /// the axis kind.
    pub fn direction_or_default(&self) -> Option<Vec3> {
        match self.direction {
            Some(d) => Some(Vec3::new(d[0], d[1], d[2])),
            None => self.kind.basis_vector(),
        }
    }
}

/// Find the dimension carrying the given axis kind, in any stored order.
pub fn find_axis(dims: &[Dimension], kind: AxisKind) -> Result<&Dimension> {
    dims.iter()
        .find(|d| d.kind == kind)
        .ok_or(CoreError::MissingAxis(kind))
}

/// Build the voxel-to-world affine from the spatial dimension records.
///
/// Row i of the rotation block is the direction cosine of physical axis i
/// (X=1, Y=2, Z=3 by id), or the standard basis vector when the record has
/// none. The linear block is the row-scaled rotation `diag(step) * R` and
/// the origin is the per-axis start projected through the rotation,
/// `R^T * start`. This is the inverse operation of [`affine_to_dims`].
pub fn dims_to_affine(dims: &[Dimension]) -> Result<Affine> {
    let mut rot = Rotation::zeros();
    let mut step = Vec3::zeros();
    let mut start = Vec3::zeros();

    for kind in [AxisKind::X, AxisKind::Y, AxisKind::Z] {
        let i = kind.spatial_index().expect("spatial kind");
        let dim = find_axis(dims, kind)?;
        let dir = dim
            .direction_or_default()
            .expect("spatial axis has a basis vector");
        rot.set_row(i, &dir.transpose());
        step[i] = dim.step;
        start[i] = dim.start;
    }

    let origin = rot.transpose() * start;

    let mut affine = Affine::identity();
    for i in 0..3 {
        for j in 0..3 {
            affine[(i, j)] = step[i] * rot[(i, j)];
        }
        affine[(i, 3)] = origin[i];
    }
    Ok(affine)
}

/// Derive standard-order-compatible dimension records from an affine and a
/// standard-order buffer shape.
///
/// The shape is the in-memory `[Z, Y, X]` (rank 3) or `[Z, Y, X, Vector]`
/// (rank 4) layout, so spatial lengths are taken in reverse iteration
/// order: physical axes are enumerated X, Y, Z while the buffer runs Z
/// slowest. Any other rank is rejected with `UnsupportedRank`.
///
/// The records come out in the customary creation order X, Y, Z
/// followed by the vector axis when present.
pub fn affine_to_dims(affine: &Affine, shape: &[usize]) -> Result<Vec<Dimension>> {
    if shape.len() != 3 && shape.len() != 4 {
        return Err(CoreError::UnsupportedRank(shape.len()));
    }

    let (start, step, dir_cos) = crate::affine::decompose(affine)?;

    let mut dims: Vec<Dimension> = (0..3)
        .map(|i| {
            let row = dir_cos.row(i);
            Dimension::with_direction(
                AxisKind::from_id(i as u8 + 1).expect("spatial id"),
                shape[2 - i],
                start[i],
                step[i],
                [row[0], row[1], row[2]],
            )
        })
        .collect();

    if shape.len() == 4 {
        dims.push(Dimension::vector(shape[3]));
    }
    Ok(dims)
}

/// Sort a dimension list into standard order (Vector, X, Y, Z, Time).
pub fn standard_order(dims: &[Dimension]) -> Vec<Dimension> {
    let mut sorted = dims.to_vec();
    sorted.sort_by_key(|d| d.kind.standard_position());
    sorted
}

/// The buffer shape (slowest-varying first) for a dimension list.
pub fn buffer_shape(dims: &[Dimension]) -> Vec<usize> {
    dims.iter().rev().map(|d| d.length).collect()
}
