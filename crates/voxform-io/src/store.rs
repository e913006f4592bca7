//! The opaque volume-store seam and the local filesystem backend.
//!
//! A store holds a header (dimension records in file order, numeric kinds,
//! value range, attribute groups) and a flat sample payload addressed by
//! per-axis hyperslabs. The backend shipped here keeps a volume as a
//! directory with a JSON header next to a little-endian payload; anything
//! else (remote objects, chunked engines) can sit behind the same trait.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use voxform_core::Dimension;

use crate::error::{IoError, Result};
use crate::kind::{DataKind, RangeScale};

const HEADER_FILE: &str = "volume.json";
const DATA_FILE: &str = "data.bin";

/// Free-form attribute value, keyed by `(group, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Numeric(Vec<f64>),
}

/// Attribute groups: group name -> attribute name -> value.
pub type AttributeGroups = BTreeMap<String, BTreeMap<String, AttrValue>>;

/// Everything a store knows about a volume except the samples.
///
/// `dims` is in file order, fastest-varying axis first; the payload is
/// laid out C-order with the slowest axis outermost (the reverse of the
/// list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    pub dims: Vec<Dimension>,
    pub store_kind: DataKind,
    pub representation_kind: DataKind,
    #[serde(default)]
    pub volume_range: Option<RangeScale>,
    #[serde(default)]
    pub attributes: AttributeGroups,
}

impl StoreHeader {
    pub fn new(dims: Vec<Dimension>, store_kind: DataKind, representation_kind: DataKind) -> Self {
        Self {
            dims,
            store_kind,
            representation_kind,
            volume_range: None,
            attributes: AttributeGroups::new(),
        }
    }

    /// Axis lengths in file order (fastest-varying first).
    pub fn lengths(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.length).collect()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|d| d.length).product()
    }

    pub fn payload_bytes(&self) -> usize {
        self.element_count() * self.store_kind.size_in_bytes()
    }
}

/// The opaque storage engine behind a volume.
///
/// Slab `start`/`count` arrays align with the header's dimension list
/// (file order, fastest-varying first); slab bytes are C-order with the
/// slowest axis outermost. Bounds are validated by the accessor above
/// this seam; implementations may assume well-formed requests.
pub trait VolumeStore {
    fn path(&self) -> &Path;
    fn header(&self) -> &StoreHeader;
    fn header_mut(&mut self) -> &mut StoreHeader;
    fn read_slab(&mut self, start: &[usize], count: &[usize]) -> Result<Vec<u8>>;
    fn write_slab(&mut self, start: &[usize], count: &[usize], bytes: &[u8]) -> Result<()>;
    /// Persist the header and any buffered payload. Also runs on drop.
    fn flush(&mut self) -> Result<()>;
}

/// Byte offset of an element at `idx` (file-order indices) in the payload.
fn element_offset(lengths: &[usize], idx: &[usize]) -> usize {
    let mut stride = 1;
    let mut off = 0;
    for (i, &len) in lengths.iter().enumerate() {
        off += idx[i] * stride;
        stride *= len;
    }
    off
}

/// Local filesystem backend: a directory holding `volume.json` and
/// `data.bin`.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    header: StoreHeader,
    data: File,
    writable: bool,
    header_dirty: bool,
}

impl LocalStore {
    /// Open an existing volume for reading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let header_path = path.join(HEADER_FILE);
        let text = fs::read_to_string(&header_path)
            .map_err(|e| IoError::io("open", &path, e))?;
        let header: StoreHeader = serde_json::from_str(&text)
            .map_err(|e| IoError::format(&header_path, e.to_string()))?;
        if header.dims.is_empty() {
            return Err(IoError::format(&header_path, "header has no dimensions"));
        }
        let data = File::open(path.join(DATA_FILE))
            .map_err(|e| IoError::io("open", &path, e))?;
        Ok(Self {
            path,
            header,
            data,
            writable: false,
            header_dirty: false,
        })
    }

    /// Create a new volume from a header, zero-sized until written.
    pub fn create(path: impl Into<PathBuf>, header: StoreHeader) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| IoError::io("create", &path, e))?;
        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.join(DATA_FILE))
            .map_err(|e| IoError::io("create", &path, e))?;
        data.set_len(header.payload_bytes() as u64)
            .map_err(|e| IoError::io("create", &path, e))?;
        let mut store = Self {
            path,
            header,
            data,
            writable: true,
            header_dirty: true,
        };
        store.write_header()?;
        Ok(store)
    }

    fn write_header(&mut self) -> Result<()> {
        let header_path = self.path.join(HEADER_FILE);
        let text = serde_json::to_string_pretty(&self.header)
            .map_err(|e| IoError::format(&header_path, e.to_string()))?;
        fs::write(&header_path, text).map_err(|e| IoError::io("write", &self.path, e))?;
        self.header_dirty = false;
        Ok(())
    }

    /// Visit every contiguous run of a slab: calls `f(byte_offset,
    /// byte_len, slab_byte_pos)` in slab buffer order.
    fn for_each_run(
        &self,
        start: &[usize],
        count: &[usize],
        mut f: impl FnMut(&mut File, u64, usize, usize) -> std::io::Result<()>,
    ) -> std::io::Result<()> {
        let lengths = self.header.lengths();
        let elem = self.header.store_kind.size_in_bytes();
        let n = lengths.len();
        let run = count[0] * elem;

        let mut data = self.data.try_clone()?;
        let mut idx = start.to_vec();
        let mut pos = 0;
        loop {
            let off = element_offset(&lengths, &idx) * elem;
            f(&mut data, off as u64, run, pos)?;
            pos += run;

            // Odometer over the non-contiguous axes, fastest first.
            let mut ax = 1;
            loop {
                if ax >= n {
                    return Ok(());
                }
                idx[ax] += 1;
                if idx[ax] < start[ax] + count[ax] {
                    break;
                }
                idx[ax] = start[ax];
                ax += 1;
            }
        }
    }
}

impl VolumeStore for LocalStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> &StoreHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut StoreHeader {
        self.header_dirty = true;
        &mut self.header
    }

    fn read_slab(&mut self, start: &[usize], count: &[usize]) -> Result<Vec<u8>> {
        let elem = self.header.store_kind.size_in_bytes();
        let total: usize = count.iter().product::<usize>() * elem;
        let mut out = vec![0u8; total];
        self.for_each_run(start, count, |data, off, len, pos| {
            data.seek(SeekFrom::Start(off))?;
            data.read_exact(&mut out[pos..pos + len])
        })
        .map_err(|e| IoError::io("read", &self.path, e))?;
        Ok(out)
    }

    fn write_slab(&mut self, start: &[usize], count: &[usize], bytes: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(IoError::io(
                "write",
                &self.path,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        self.for_each_run(start, count, |data, off, len, pos| {
            data.seek(SeekFrom::Start(off))?;
            data.write_all(&bytes[pos..pos + len])
        })
        .map_err(|e| IoError::io("write", &self.path, e))
    }

    fn flush(&mut self) -> Result<()> {
        if self.header_dirty {
            self.write_header()?;
        }
        if self.writable {
            self.data
                .sync_all()
                .map_err(|e| IoError::io("flush", &self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "flush on drop failed");
        }
    }
}
