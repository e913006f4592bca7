//! Whole-volume convenience layer: load a store into a [`Volume`] and
//! save one back, in standard order with the derived affine.

use std::path::Path;

use tracing::info;
use voxform_core::{AxisKind, Volume};

use crate::error::Result;
use crate::file::{VolumeDefinition, VolumeFile};
use crate::kind::DataKind;

/// Open a volume store, switch to standard order, and load the samples
/// with their sampling description.
pub fn load_volume(path: impl AsRef<Path>) -> Result<Volume> {
    let path = path.as_ref();
    let mut file = VolumeFile::open(path)?;
    file.setup_standard_order();
    let data = file.load_complete()?;
    let dims = file.representation_dims();
    info!(path = %path.display(), shape = ?data.shape(), "loaded volume");
    Ok(Volume::new(data, dims)?)
}

/// Save a volume to a new store, short storage with double representation
/// and a value range covering the data, optionally copying metadata from
/// a reference volume.
pub fn save_volume(
    path: impl AsRef<Path>,
    volume: &Volume,
    reference: Option<&Path>,
) -> Result<()> {
    let path = path.as_ref();

    // Creation order: spatial axes X, Y, Z first, then the vector axis.
    let mut dims: Vec<_> = volume
        .dims()
        .iter()
        .filter(|d| d.kind != AxisKind::Vector)
        .cloned()
        .collect();
    dims.sort_by_key(|d| d.kind.spatial_index().unwrap_or(usize::MAX));
    if let Some(v) = volume.vector_length() {
        dims.push(voxform_core::Dimension::vector(v));
    }

    let mut out = VolumeDefinition::new(dims, DataKind::Short, DataKind::Double).create(path)?;
    if let Some(ref_path) = reference {
        let reference = VolumeFile::open(ref_path)?;
        out.copy_metadata(&reference);
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in volume.data() {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        (min, max) = (0.0, 0.0);
    }
    out.set_volume_range(min, max)?;

    out.setup_standard_order();
    out.save_complete(volume.data())?;
    out.flush()?;
    info!(path = %path.display(), shape = ?volume.shape(), "saved volume");
    Ok(())
}
