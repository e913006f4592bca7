//! Transform files: concatenations of typed links, each a linear 4x4
//! matrix or a reference to a displacement-grid volume.
//!
//! The text format starts with an `MNI Transform File` magic line,
//! `%`-prefixed comments, and one `Transform_Type` block per link in
//! application order: `Linear` blocks embed the top three rows of the
//! matrix, `Grid_Transform` blocks name the displacement volume and an
//! optional inversion flag.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use voxform_core::affine::TransformParameters;
use voxform_core::geometry::frobenius_distance;
use voxform_core::transform::IDENTITY_EPS;
use voxform_core::{Affine, CoreError, TransformChain, TransformLink};

use crate::error::{IoError, Result};
use crate::volume::load_volume;

const MAGIC: &str = "MNI Transform File";

/// Kind of a transform file link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XfmLinkKind {
    Linear,
    GridTransform,
}

/// One link of a transform file, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum XfmLink {
    Linear(Affine),
    Grid { path: PathBuf, invert: bool },
}

impl XfmLink {
    pub fn kind(&self) -> XfmLinkKind {
        match self {
            Self::Linear(_) => XfmLinkKind::Linear,
            Self::Grid { .. } => XfmLinkKind::GridTransform,
        }
    }
}

/// Linear link initializer: an explicit matrix or a centred parameter
/// set, resolved to a matrix when appended.
pub enum LinearInit {
    Matrix(Affine),
    Parameters(TransformParameters),
}

impl From<Affine> for LinearInit {
    fn from(m: Affine) -> Self {
        Self::Matrix(m)
    }
}

impl From<TransformParameters> for LinearInit {
    fn from(p: TransformParameters) -> Self {
        Self::Parameters(p)
    }
}

/// In-memory transform file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XfmFile {
    links: Vec<XfmLink>,
}

impl XfmFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of concatenated links.
    pub fn n_concat(&self) -> usize {
        self.links.len()
    }

    /// Links in application order (first link applied first).
    pub fn links(&self) -> &[XfmLink] {
        &self.links
    }

    /// Kind of the i-th link.
    pub fn link_kind(&self, i: usize) -> Option<XfmLinkKind> {
        self.links.get(i).map(XfmLink::kind)
    }

    pub fn append_linear(&mut self, init: impl Into<LinearInit>) -> &mut Self {
        let matrix = match init.into() {
            LinearInit::Matrix(m) => m,
            LinearInit::Parameters(p) => p.to_matrix(),
        };
        self.links.push(XfmLink::Linear(matrix));
        self
    }

    pub fn append_grid(&mut self, path: impl Into<PathBuf>, invert: bool) -> &mut Self {
        self.links.push(XfmLink::Grid {
            path: path.into(),
            invert,
        });
        self
    }

    /// Append every link of another file, applied after this one's.
    pub fn concat(&mut self, other: &XfmFile) -> &mut Self {
        self.links.extend(other.links.iter().cloned());
        self
    }

    /// Parse a transform file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| IoError::io("open", path, e))?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim_start().starts_with(MAGIC) => {}
            _ => {
                return Err(IoError::format(path, format!("missing `{MAGIC}` magic")));
            }
        }

        // Strip comments, then split the remainder into `key = value`
        // statements terminated by semicolons.
        let body: String = lines
            .map(|l| match l.find('%') {
                Some(i) => &l[..i],
                None => l,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut links = Vec::new();
        let mut pending: Option<&str> = None;
        let mut pending_invert = false;

        for stmt in body.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let (key, value) = stmt
                .split_once('=')
                .ok_or_else(|| IoError::format(path, format!("malformed statement `{stmt}`")))?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "Transform_Type" => {
                    if pending.is_some() {
                        return Err(IoError::format(path, "transform type without a body"));
                    }
                    pending = Some(match value {
                        "Linear" => "Linear",
                        "Grid_Transform" => "Grid_Transform",
                        other => {
                            return Err(IoError::format(
                                path,
                                format!("unsupported transform type `{other}`"),
                            ))
                        }
                    });
                    pending_invert = false;
                }
                "Linear_Transform" => {
                    if pending != Some("Linear") {
                        return Err(IoError::format(path, "matrix outside a Linear block"));
                    }
                    let numbers: std::result::Result<Vec<f64>, _> =
                        value.split_whitespace().map(str::parse).collect();
                    let numbers = numbers
                        .map_err(|e| IoError::format(path, format!("bad matrix entry: {e}")))?;
                    if numbers.len() != 12 {
                        return Err(IoError::format(
                            path,
                            format!("expected 12 matrix entries, got {}", numbers.len()),
                        ));
                    }
                    let mut m = Affine::identity();
                    for r in 0..3 {
                        for c in 0..4 {
                            m[(r, c)] = numbers[r * 4 + c];
                        }
                    }
                    links.push(XfmLink::Linear(m));
                    pending = None;
                }
                "Invert_Flag" => {
                    if pending != Some("Grid_Transform") {
                        return Err(IoError::format(path, "invert flag outside a grid block"));
                    }
                    pending_invert = value.eq_ignore_ascii_case("true");
                }
                "Displacement_Volume" => {
                    if pending != Some("Grid_Transform") {
                        return Err(IoError::format(
                            path,
                            "displacement volume outside a grid block",
                        ));
                    }
                    links.push(XfmLink::Grid {
                        path: PathBuf::from(value),
                        invert: pending_invert,
                    });
                    pending = None;
                }
                other => {
                    debug!(key = other, "ignoring unknown transform file key");
                }
            }
        }
        if pending.is_some() {
            return Err(IoError::format(path, "unterminated transform block"));
        }
        Ok(Self { links })
    }

    /// Write the transform file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut out = String::new();
        out.push_str(MAGIC);
        out.push('\n');
        for link in &self.links {
            out.push('\n');
            match link {
                XfmLink::Linear(m) => {
                    out.push_str("Transform_Type = Linear;\n");
                    out.push_str("Linear_Transform =\n");
                    for r in 0..3 {
                        let _ = writeln!(
                            out,
                            " {} {} {} {}{}",
                            m[(r, 0)],
                            m[(r, 1)],
                            m[(r, 2)],
                            m[(r, 3)],
                            if r == 2 { ";" } else { "" }
                        );
                    }
                }
                XfmLink::Grid { path: grid, invert } => {
                    out.push_str("Transform_Type = Grid_Transform;\n");
                    if *invert {
                        out.push_str("Invert_Flag = True;\n");
                    }
                    let _ = writeln!(out, "Displacement_Volume = {};", grid.display());
                }
            }
        }
        fs::write(path, out).map_err(|e| IoError::io("save", path, e))
    }
}

/// Resolve a grid volume path relative to the transform file it came from.
fn resolve_grid_path(xfm_path: &Path, grid: &Path) -> PathBuf {
    if grid.is_absolute() {
        grid.to_path_buf()
    } else {
        xfm_path.parent().unwrap_or(Path::new(".")).join(grid)
    }
}

/// Load a purely linear transform file as a single matrix.
///
/// All-linear concatenations collapse to the product of their links in
/// application order; a file containing a grid link is rejected.
pub fn load_linear(path: impl AsRef<Path>) -> Result<Affine> {
    let path = path.as_ref();
    let xfm = XfmFile::open(path)?;
    let mut total = Affine::identity();
    for link in xfm.links() {
        match link {
            XfmLink::Linear(m) => total = m * total,
            XfmLink::Grid { .. } => {
                return Err(IoError::Core(CoreError::compose(
                    "expected a linear transform file, found a displacement grid link",
                )))
            }
        }
    }
    Ok(total)
}

/// Load a grid transform file, returning the displacement volume path and
/// inversion flag.
///
/// Accepts a bare grid link or the common `Linear(identity) + Grid`
/// encoding; the leading linear link must be within tolerance of
/// identity, anything else is a compose error rather than silently
/// dropped.
pub fn load_grid(path: impl AsRef<Path>) -> Result<(PathBuf, bool)> {
    let path = path.as_ref();
    let xfm = XfmFile::open(path)?;
    let (grid, invert) = match xfm.links() {
        [XfmLink::Grid { path: g, invert }] => (g.clone(), *invert),
        [XfmLink::Linear(m), XfmLink::Grid { path: g, invert }] => {
            let dist = frobenius_distance(m, &Affine::identity());
            if dist > IDENTITY_EPS {
                return Err(IoError::Core(CoreError::compose(format!(
                    "leading linear link deviates from identity by {dist:.3e}"
                ))));
            }
            (g.clone(), *invert)
        }
        links => {
            return Err(IoError::Core(CoreError::compose(format!(
                "unsupported grid transform topology with {} links",
                links.len()
            ))))
        }
    };
    Ok((resolve_grid_path(path, &grid), invert))
}

/// Load a transform file into a transform chain, reading referenced
/// displacement volumes from their stores.
pub fn load_chain(path: impl AsRef<Path>) -> Result<TransformChain> {
    let path = path.as_ref();
    let xfm = XfmFile::open(path)?;
    let mut chain = TransformChain::new();
    // File links are in application order; the chain applies the last
    // appended link first.
    for link in xfm.links().iter().rev() {
        match link {
            XfmLink::Linear(m) => chain.append(TransformLink::Linear(*m)),
            XfmLink::Grid { path: g, invert } => {
                let volume = load_volume(resolve_grid_path(path, g))?;
                chain.append(TransformLink::Grid {
                    volume,
                    invert: *invert,
                });
            }
        }
    }
    Ok(chain)
}
