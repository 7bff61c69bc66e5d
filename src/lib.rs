//! `mzcache` indexes, caches and retrieves the spectra stored in MGF and mzML
//! files, and bins precursor masses for fast lookup within a mass tolerance.
//!
//! - [`io`] reads records and builds [`FileIndex`] tables of their byte offsets,
//!   persisted next to each source file until it changes.
//! - [`cache`] reads spectra on demand into a bounded [`SpectrumCache`].
//! - [`binning`] groups precursor masses by [`Tolerance`] with [`PrecursorBinner`].
pub mod binning;
pub mod cache;
pub mod error;
pub mod io;
pub mod mass_error;
pub mod peaks;
pub mod prelude;
pub mod spectrum;
pub mod utils;

pub use crate::binning::{PrecursorBinner, PrecursorMatch};
pub use crate::cache::{CacheConfig, SpectrumCache, SpectrumCacheBuilder, SpectrumKey};
pub use crate::error::{Result, SpectrumCacheError};
pub use crate::io::{FileIndex, FileIndexEntry, RetryPolicy};
pub use crate::mass_error::Tolerance;
pub use crate::peaks::{Peak, PeakMap};
pub use crate::spectrum::{Charge, Precursor, Spectrum, SpectrumKind};

#[cfg(feature = "mgf")]
pub use crate::io::mgf::MGFRecordReader;
#[cfg(feature = "mzml")]
pub use crate::io::mzml::MzMLRecordReader;
