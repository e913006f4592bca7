//! Spatial transforms: linear matrices, displacement grids, and chains.
//!
//! A transform is a tagged link — either a 4x4 matrix or a displacement
//! grid with its own sampling — and a [`TransformChain`] is an ordered
//! sequence of links. The most recently appended link is applied first
//! when evaluating points, so an all-linear chain composes to the matrix
//! product of its links in append order.

mod grid;

pub use grid::displace_point;

use tracing::debug;

use crate::error::{CoreError, Result};
use crate::geometry::{apply_affine, frobenius_distance, Affine, Vec3};
use crate::volume::Volume;

/// Tolerance on the Frobenius norm when a linear link must be identity.
pub const IDENTITY_EPS: f64 = 1e-6;

/// One link of a transform chain.
#[derive(Debug, Clone)]
pub enum TransformLink {
    /// World-to-world 4x4 matrix.
    Linear(Affine),
    /// Dense displacement grid; voxel values are world-space offsets. The
    /// grid carries its own sampling, independent of the volumes it will
    /// be applied to. `invert` is a lazy flag: it flips how the grid is
    /// interpreted, it never computes an inverse field.
    Grid { volume: Volume, invert: bool },
}

impl TransformLink {
    /// Whether this is a linear link within `tol` of the identity matrix.
    pub fn is_identity(&self, tol: f64) -> bool {
        match self {
            Self::Linear(m) => frobenius_distance(m, &Affine::identity()) <= tol,
            Self::Grid { .. } => false,
        }
    }

    /// The inverse link.
    ///
    /// Linear links invert their matrix; grid links only toggle the
    /// `invert` flag — actually evaluating a flagged grid is rejected at
    /// application time, not silently approximated.
    pub fn inverted(self) -> Result<Self> {
        match self {
            Self::Linear(m) => {
                let inv = m.try_inverse().ok_or(CoreError::DegenerateAffine)?;
                Ok(Self::Linear(inv))
            }
            Self::Grid { volume, invert } => Ok(Self::Grid {
                volume,
                invert: !invert,
            }),
        }
    }

    /// Apply the link to a world point.
    pub fn apply(&self, p: &Vec3) -> Result<Vec3> {
        match self {
            Self::Linear(m) => Ok(apply_affine(m, p)),
            Self::Grid {
                volume,
                invert: false,
            } => displace_point(volume, p),
            Self::Grid { invert: true, .. } => Err(CoreError::unsupported(
                "evaluation of an inverted displacement grid",
            )),
        }
    }

    /// Apply the inverse of the link to a world point.
    pub fn apply_inverse(&self, p: &Vec3) -> Result<Vec3> {
        match self {
            Self::Linear(m) => {
                let inv = m.try_inverse().ok_or(CoreError::DegenerateAffine)?;
                Ok(apply_affine(&inv, p))
            }
            Self::Grid {
                volume,
                invert: true,
            } => displace_point(volume, p),
            Self::Grid { invert: false, .. } => Err(CoreError::unsupported(
                "evaluation of an inverted displacement grid",
            )),
        }
    }
}

/// Ordered sequence of transform links.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    links: Vec<TransformLink>,
}

impl TransformChain {
    /// Empty chain (the identity transform).
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain holding a single linear link.
    pub fn linear(matrix: Affine) -> Self {
        Self {
            links: vec![TransformLink::Linear(matrix)],
        }
    }

    /// Chain holding a single grid link.
    pub fn grid(volume: Volume, invert: bool) -> Self {
        Self {
            links: vec![TransformLink::Grid { volume, invert }],
        }
    }

    pub fn from_links(links: Vec<TransformLink>) -> Self {
        Self { links }
    }

    pub fn links(&self) -> &[TransformLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Append a link. The last appended link is applied first when
    /// transforming points.
    pub fn append(&mut self, link: TransformLink) {
        self.links.push(link);
    }

    /// Append all links of another chain; `other` is applied before the
    /// existing links.
    pub fn concat(&mut self, other: TransformChain) {
        self.links.extend(other.links);
    }

    /// The inverse chain: links reversed, each link inverted.
    pub fn invert(self) -> Result<Self> {
        let mut links = Vec::with_capacity(self.links.len());
        for link in self.links.into_iter().rev() {
            links.push(link.inverted()?);
        }
        Ok(Self { links })
    }

    /// Map a world point through the chain.
    pub fn transform_point(&self, p: &Vec3) -> Result<Vec3> {
        let mut q = *p;
        for link in self.links.iter().rev() {
            q = link.apply(&q)?;
        }
        Ok(q)
    }

    /// Map a world point through the inverse of the chain.
    pub fn inverse_transform_point(&self, p: &Vec3) -> Result<Vec3> {
        let mut q = *p;
        for link in self.links.iter() {
            q = link.apply_inverse(&q)?;
        }
        Ok(q)
    }

    /// Collapse an all-linear chain into a single matrix.
    pub fn as_matrix(&self) -> Result<Affine> {
        let mut m = Affine::identity();
        for link in &self.links {
            match link {
                TransformLink::Linear(l) => m *= *l,
                TransformLink::Grid { .. } => {
                    return Err(CoreError::compose(
                        "chain contains a displacement grid, cannot collapse to a matrix",
                    ))
                }
            }
        }
        Ok(m)
    }

    /// Recognize a pure grid transform.
    ///
    /// The common on-disk encoding of a non-linear transform is the
    /// two-link pattern `Linear(identity) + Grid`; a bare `Grid` link is
    /// accepted too. Every linear link present must be within 1e-6
    /// (Frobenius) of identity, otherwise the chain is not grid-only and
    /// the call fails rather than dropping the linear part.
    pub fn grid_only(&self) -> Result<(&Volume, bool)> {
        let mut grid = None;
        for link in &self.links {
            match link {
                TransformLink::Linear(m) => {
                    let dist = frobenius_distance(m, &Affine::identity());
                    if dist > IDENTITY_EPS {
                        return Err(CoreError::compose(format!(
                            "linear link deviates from identity by {dist:.3e} in a grid transform chain"
                        )));
                    }
                    debug!(deviation = dist, "accepting identity linear link");
                }
                TransformLink::Grid { volume, invert } => {
                    if grid.is_some() {
                        return Err(CoreError::compose(
                            "more than one displacement grid in chain",
                        ));
                    }
                    grid = Some((volume, *invert));
                }
            }
        }
        grid.ok_or_else(|| CoreError::compose("chain has no displacement grid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::{scale_matrix, translation_matrix};
    use crate::dims::{AxisKind, Dimension};
    use ndarray::ArrayD;
    use ndarray::IxDyn;

    fn constant_grid(offset: [f64; 3]) -> Volume {
        let mut data = ArrayD::zeros(IxDyn(&[4, 4, 4, 3]));
        for (ix, v) in data.indexed_iter_mut() {
            *v = offset[ix[3]];
        }
        let dims = vec![
            Dimension::spatial(AxisKind::X, 4, -1.0, 1.0),
            Dimension::spatial(AxisKind::Y, 4, -1.0, 1.0),
            Dimension::spatial(AxisKind::Z, 4, -1.0, 1.0),
            Dimension::vector(3),
        ];
        Volume::new(data, dims).unwrap()
    }

    #[test]
    fn test_linear_inversion_symmetry() {
        let m = translation_matrix(&Vec3::new(3.0, -4.0, 5.0)) * scale_matrix(&Vec3::new(2.0, 0.5, 1.5));
        let chain = TransformChain::linear(m);
        let p = Vec3::new(1.2, -3.4, 5.6);
        let q = chain.transform_point(&p).unwrap();
        let back = chain.clone().invert().unwrap().transform_point(&q).unwrap();
        assert!((back - p).norm() < 1e-6);
        // inverse_transform_point agrees with the inverted chain.
        let back2 = chain.inverse_transform_point(&q).unwrap();
        assert!((back2 - p).norm() < 1e-12);
    }

    #[test]
    fn test_chain_application_order() {
        // links [A, B]: B applied first, so the result is A(B(x)).
        let a = scale_matrix(&Vec3::new(2.0, 2.0, 2.0));
        let b = translation_matrix(&Vec3::new(1.0, 0.0, 0.0));
        let mut chain = TransformChain::linear(a);
        chain.append(TransformLink::Linear(b));
        let p = chain.transform_point(&Vec3::zeros()).unwrap();
        assert!((p - Vec3::new(2.0, 0.0, 0.0)).norm() < 1e-12);
        assert!(frobenius_distance(&chain.as_matrix().unwrap(), &(a * b)) < 1e-12);
    }

    #[test]
    fn test_grid_point_displacement() {
        let grid = constant_grid([0.5, -0.25, 1.0]);
        let chain = TransformChain::grid(grid, false);
        let p = Vec3::new(0.0, 0.0, 0.0);
        let q = chain.transform_point(&p).unwrap();
        assert!((q - Vec3::new(0.5, -0.25, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn test_inverted_grid_evaluation_is_fatal() {
        let chain = TransformChain::grid(constant_grid([0.5, 0.0, 0.0]), true);
        assert!(matches!(
            chain.transform_point(&Vec3::zeros()),
            Err(CoreError::Unsupported(_))
        ));
        // The lazy toggle itself is fine, and makes the inverse usable.
        let inv = chain.invert().unwrap();
        assert!(inv.transform_point(&Vec3::zeros()).is_ok());
    }

    #[test]
    fn test_grid_only_accepts_identity_prefix() {
        let mut chain = TransformChain::linear(Affine::identity());
        chain.append(TransformLink::Grid {
            volume: constant_grid([0.0, 0.0, 0.0]),
            invert: false,
        });
        let (_, invert) = chain.grid_only().unwrap();
        assert!(!invert);
    }

    #[test]
    fn test_grid_only_rejects_non_identity_linear() {
        let mut m = Affine::identity();
        m[(0, 3)] = 1e-3;
        let mut chain = TransformChain::linear(m);
        chain.append(TransformLink::Grid {
            volume: constant_grid([0.0, 0.0, 0.0]),
            invert: false,
        });
        assert!(matches!(chain.grid_only(), Err(CoreError::Compose(_))));
    }

    #[test]
    fn test_grid_only_requires_a_grid() {
        let chain = TransformChain::linear(Affine::identity());
        assert!(matches!(chain.grid_only(), Err(CoreError::Compose(_))));
    }
}
