//! The spectrum data model: charges, precursors and spectra with memoized
//! summary statistics.
pub mod peaks;
pub mod scan_properties;
pub mod spectrum_types;

pub use crate::spectrum::peaks::{LogIntensityDistribution, SpectrumSummary};
pub use crate::spectrum::scan_properties::{
    parse_charge_list, Charge, ChargeParseError, ChargeSign, Precursor,
};
pub use crate::spectrum::spectrum_types::{Spectrum, SpectrumDescription, SpectrumKind};
