//! Volume accessor: whole-volume and hyperslab access in standard axis
//! order on top of an opaque store backend.
//!
//! The store keeps dimensions in whatever order the file carries them;
//! the accessor remaps every buffer and selection between that order and
//! standard order (Vector, X, Y, Z, Time), converts numeric kinds at the
//! boundary, and owns the handle lifecycle — dropping the accessor
//! flushes the store unconditionally.

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use tracing::debug;
use voxform_core::{CoreError, Dimension};

use crate::error::{IoError, Result};
use crate::kind::{DataKind, RangeScale};
use crate::store::{AttrValue, AttributeGroups, LocalStore, StoreHeader, VolumeStore};

/// Per-axis hyperslab selection, in external (buffer) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slab {
    /// The whole extent of the axis.
    Full,
    /// A single index; the axis is squeezed from the result.
    At(usize),
    /// `count` voxels starting at `start`.
    Range { start: usize, count: usize },
}

/// Pending definition of a new volume: dimensions in creation order plus
/// the stored and represented numeric kinds.
pub struct VolumeDefinition {
    dims: Vec<Dimension>,
    store_kind: DataKind,
    representation_kind: DataKind,
}

impl VolumeDefinition {
    pub fn new(dims: Vec<Dimension>, store_kind: DataKind, representation_kind: DataKind) -> Self {
        Self {
            dims,
            store_kind,
            representation_kind,
        }
    }

    /// Create the defined volume at `path` and return its handle.
    pub fn create(self, path: impl Into<PathBuf>) -> Result<VolumeFile> {
        let path = path.into();
        if self.dims.is_empty() {
            return Err(IoError::format(&path, "volume defined with no dimensions"));
        }
        if let Some(d) = self.dims.iter().find(|d| d.length == 0) {
            return Err(IoError::format(
                &path,
                format!("zero-length {:?} dimension", d.kind),
            ));
        }
        let header = StoreHeader::new(self.dims, self.store_kind, self.representation_kind);
        let store = LocalStore::create(path, header)?;
        Ok(VolumeFile::from_store(Box::new(store)))
    }
}

/// Handle to an open volume.
///
/// Exclusively owned by the caller that opened it; concurrent readers of
/// distinct handles on one path are fine, concurrent writers are not.
pub struct VolumeFile {
    store: Box<dyn VolumeStore>,
    /// Representation order: position j holds the file-dimension index of
    /// the j-th representation dimension. Identity until
    /// [`setup_standard_order`](Self::setup_standard_order) is called.
    rep_order: Vec<usize>,
    wrote_data: bool,
}

impl VolumeFile {
    /// Open an existing volume for reading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = LocalStore::open(path)?;
        Ok(Self::from_store(Box::new(store)))
    }

    /// Wrap an already-open store backend.
    pub fn from_store(store: Box<dyn VolumeStore>) -> Self {
        let n = store.header().dims.len();
        Self {
            store,
            rep_order: (0..n).collect(),
            wrote_data: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn ndim(&self) -> usize {
        self.store.header().dims.len()
    }

    pub fn store_kind(&self) -> DataKind {
        self.store.header().store_kind
    }

    pub fn representation_kind(&self) -> DataKind {
        self.store.header().representation_kind
    }

    /// Dimensions in file order.
    pub fn store_dims(&self) -> &[Dimension] {
        &self.store.header().dims
    }

    /// Dimensions in the current representation order.
    pub fn representation_dims(&self) -> Vec<Dimension> {
        let dims = &self.store.header().dims;
        self.rep_order.iter().map(|&f| dims[f].clone()).collect()
    }

    /// Switch the representation to standard order (Vector, X, Y, Z,
    /// Time); buffers and selections are remapped from here on.
    pub fn setup_standard_order(&mut self) {
        let dims = &self.store.header().dims;
        let mut order: Vec<usize> = (0..dims.len()).collect();
        order.sort_by_key(|&f| dims[f].kind.standard_position());
        debug!(?order, "standard order permutation");
        self.rep_order = order;
    }

    /// Set the global value range used to scale integer storage.
    ///
    /// One-time configuration; must precede the first write.
    pub fn set_volume_range(&mut self, real_min: f64, real_max: f64) -> Result<()> {
        if self.wrote_data {
            return Err(IoError::type_mismatch(
                "volume range must be set before the first write",
            ));
        }
        self.store.header_mut().volume_range = Some(RangeScale { real_min, real_max });
        Ok(())
    }

    fn scale(&self) -> Option<RangeScale> {
        if self.store.header().store_kind.is_integer() {
            self.store.header().volume_range
        } else {
            None
        }
    }

    /// Load the whole volume as f64, in representation order.
    pub fn load_complete(&mut self) -> Result<ArrayD<f64>> {
        self.load_hyperslab(&[])
    }

    /// Save the whole volume from an f64 buffer in representation order.
    pub fn save_complete(&mut self, data: &ArrayD<f64>) -> Result<()> {
        self.save_hyperslab(data, &[])
    }

    /// Resolve a buffer-order selection into per-file-axis start/count,
    /// plus which buffer axes get squeezed.
    fn resolve_slab(
        &self,
        slab: &[Slab],
    ) -> Result<(Vec<usize>, Vec<usize>, Vec<bool>)> {
        let n = self.ndim();
        if slab.len() > n {
            return Err(IoError::format(
                self.path(),
                format!("{} slab entries for a {}-dimensional volume", slab.len(), n),
            ));
        }
        let dims = &self.store.header().dims;
        let mut file_start = vec![0usize; n];
        let mut file_count = vec![0usize; n];
        let mut squeeze = vec![false; n];

        // Buffer axes run slowest first; iterate them in reverse to land
        // on representation positions, defaulting missing entries to the
        // full extent.
        for i in 0..n {
            let r = n - 1 - i;
            let f = self.rep_order[r];
            let length = dims[f].length;
            let sel = slab.get(i).copied().unwrap_or(Slab::Full);
            let (start, count) = match sel {
                Slab::Full => (0, length),
                Slab::At(k) => {
                    squeeze[i] = true;
                    (k, 1)
                }
                Slab::Range { start, count } => (start, count),
            };
            if count == 0 || start + count > length {
                return Err(IoError::OutOfBounds {
                    axis: i,
                    start,
                    count,
                    length,
                });
            }
            file_start[f] = start;
            file_count[f] = count;
        }
        Ok((file_start, file_count, squeeze))
    }

    /// Permutation taking a buffer in reversed-file order to reversed
    /// representation order: output axis i is input axis `perm[i]`.
    fn buffer_permutation(&self) -> Vec<usize> {
        let n = self.ndim();
        (0..n).map(|i| n - 1 - self.rep_order[n - 1 - i]).collect()
    }

    fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
        let mut inv = vec![0usize; perm.len()];
        for (i, &p) in perm.iter().enumerate() {
            inv[p] = i;
        }
        inv
    }

    /// Load a hyperslab as f64. Scalar (`At`) axes are squeezed from the
    /// result.
    pub fn load_hyperslab(&mut self, slab: &[Slab]) -> Result<ArrayD<f64>> {
        let (file_start, file_count, squeeze) = self.resolve_slab(slab)?;
        let bytes = self.store.read_slab(&file_start, &file_count)?;
        let values = self
            .store_kind()
            .decode(&bytes, self.scale().as_ref())?;

        let file_rev_shape: Vec<usize> = file_count.iter().rev().copied().collect();
        let arr = ArrayD::from_shape_vec(IxDyn(&file_rev_shape), values)
            .map_err(|e| IoError::format(self.path(), e.to_string()))?;

        let mut out = arr
            .permuted_axes(IxDyn(&self.buffer_permutation()))
            .as_standard_layout()
            .into_owned();
        for i in (0..squeeze.len()).rev() {
            if squeeze[i] {
                out = out.index_axis_move(Axis(i), 0);
            }
        }
        Ok(out)
    }

    /// Save a hyperslab from an f64 buffer. The buffer shape must match
    /// the selection with scalar axes omitted.
    pub fn save_hyperslab(&mut self, data: &ArrayD<f64>, slab: &[Slab]) -> Result<()> {
        if self.store_kind().is_integer() && self.store.header().volume_range.is_none() {
            return Err(IoError::type_mismatch(format!(
                "{:?} storage requires a volume range before writing",
                self.store_kind()
            )));
        }

        let (file_start, file_count, squeeze) = self.resolve_slab(slab)?;
        let n = self.ndim();

        // Reinstate squeezed axes so the buffer aligns with the selection.
        let mut view: ArrayViewD<'_, f64> = data.view();
        for (i, &sq) in squeeze.iter().enumerate() {
            if sq {
                if view.ndim() >= n {
                    return Err(IoError::Core(CoreError::ShapeMismatch {
                        expected: (0..n)
                            .map(|i| file_count[self.rep_order[n - 1 - i]])
                            .collect(),
                        actual: data.shape().to_vec(),
                    }));
                }
                view = view.insert_axis(Axis(i));
            }
        }

        let expected: Vec<usize> = (0..n)
            .map(|i| file_count[self.rep_order[n - 1 - i]])
            .collect();
        if view.shape() != expected.as_slice() {
            return Err(IoError::Core(CoreError::ShapeMismatch {
                expected,
                actual: data.shape().to_vec(),
            }));
        }

        let perm = self.buffer_permutation();
        let inv = Self::inverse_permutation(&perm);
        let file_rev = view
            .permuted_axes(IxDyn(&inv))
            .as_standard_layout()
            .into_owned();
        let flat = file_rev.as_slice().expect("standard layout").to_vec();
        let bytes = self.store_kind().encode(&flat, self.scale().as_ref());
        self.store.write_slab(&file_start, &file_count, &bytes)?;
        self.wrote_data = true;
        Ok(())
    }

    /// Read one attribute, `None` when absent.
    pub fn read_attribute(&self, group: &str, name: &str) -> Option<&AttrValue> {
        self.store.header().attributes.get(group)?.get(name)
    }

    /// Write one attribute, creating its group as needed.
    pub fn write_attribute(&mut self, group: &str, name: &str, value: AttrValue) {
        self.store
            .header_mut()
            .attributes
            .entry(group.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// All attribute groups.
    pub fn metadata(&self) -> &AttributeGroups {
        &self.store.header().attributes
    }

    /// Copy every attribute group from another volume.
    pub fn copy_metadata(&mut self, other: &VolumeFile) {
        let attrs = other.store.header().attributes.clone();
        self.store.header_mut().attributes.extend(attrs);
    }

    /// Persist the header and payload now, surfacing errors that a drop
    /// would only log.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }
}
