//! A set of foundational traits and types used throughout the library.
pub use crate::binning::PrecursorBinner;
pub use crate::cache::{SpectrumCache, SpectrumCacheBuilder, SpectrumKey};
pub use crate::io::{SeekRead, SpectrumRecordSource};
pub use crate::mass_error::Tolerance;
pub use crate::spectrum::{Precursor, Spectrum, SpectrumKind};
pub use std::io::prelude::*;
