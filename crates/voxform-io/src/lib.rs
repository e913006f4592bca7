//! Volume store access and transform-file I/O.
//!
//! The storage engine itself is behind the [`store::VolumeStore`] seam —
//! the crate ships a local filesystem backend — and [`file::VolumeFile`]
//! wraps a backend to expose whole-volume and hyperslab reads and writes
//! in standard axis order, with numeric-kind conversion at the boundary.
//! [`xfm`] reads and writes transform files (linear matrices and
//! displacement-grid references).

pub mod error;
pub mod file;
pub mod kind;
pub mod store;
pub mod volume;
pub mod xfm;

pub use error::{IoError, Result};
pub use file::{Slab, VolumeDefinition, VolumeFile};
pub use kind::DataKind;
pub use store::{AttrValue, LocalStore, StoreHeader, VolumeStore};
pub use volume::{load_volume, save_volume};
pub use xfm::{XfmFile, XfmLink, XfmLinkKind};
