use std::fmt;

use serde::{Deserialize, Serialize};

use super::peaks::{LogIntensityDistribution, PeakStatistics, SpectrumSummary};
use super::scan_properties::Precursor;
use crate::peaks::{Peak, PeakMap};

/// Whether a spectrum is a survey scan or the product of a fragmentation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectrumKind {
    MS1,
    MSn,
}

/// The descriptive metadata of a spectrum, everything except its peaks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDescription {
    /// The spectrum's title, unique within its source file
    pub title: String,
    /// The name of the file the spectrum was read from
    pub source_file: String,
    /// The MS exponentiation level of the spectrum
    pub ms_level: u8,
    /// The scan number(s) reported by the source file, if any
    pub scan_number: Option<String>,
    /// When the scan started, in seconds
    pub scan_start_time: f64,
}

impl Default for SpectrumDescription {
    fn default() -> Self {
        Self {
            title: String::new(),
            source_file: String::new(),
            ms_level: 1,
            scan_number: None,
            scan_start_time: 0.0,
        }
    }
}

/// A mass spectrum, a collection of [`Peak`]s with metadata and, for MSn
/// spectra, the [`Precursor`] that was fragmented.
///
/// Derived statistics such as the total intensity or the sorted m/z array are
/// computed on first use and memoized per spectrum. Any mutation of the peaks
/// through [`Spectrum::peaks_mut`], [`Spectrum::add_peak`] or
/// [`Spectrum::set_peaks`] discards every memoized value.
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    pub description: SpectrumDescription,
    pub precursor: Option<Precursor>,
    peaks: PeakMap,
    statistics: PeakStatistics,
}

impl PartialEq for Spectrum {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description
            && self.precursor == other.precursor
            && self.peaks == other.peaks
    }
}

impl fmt::Display for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Spectrum({:?}, level={}, peaks={})",
            self.description.title,
            self.description.ms_level,
            self.peaks.len()
        )
    }
}

impl Spectrum {
    pub fn new(description: SpectrumDescription, precursor: Option<Precursor>, peaks: PeakMap) -> Self {
        Self {
            description,
            precursor,
            peaks,
            statistics: PeakStatistics::default(),
        }
    }

    pub fn title(&self) -> &str {
        &self.description.title
    }

    pub fn source_file(&self) -> &str {
        &self.description.source_file
    }

    pub fn ms_level(&self) -> u8 {
        self.description.ms_level
    }

    pub fn scan_start_time(&self) -> f64 {
        self.description.scan_start_time
    }

    pub fn kind(&self) -> SpectrumKind {
        if self.precursor.is_some() || self.description.ms_level > 1 {
            SpectrumKind::MSn
        } else {
            SpectrumKind::MS1
        }
    }

    pub fn precursor(&self) -> Option<&Precursor> {
        self.precursor.as_ref()
    }

    pub fn peaks(&self) -> &PeakMap {
        &self.peaks
    }

    /// Mutable access to the peaks. Discards all memoized statistics.
    pub fn peaks_mut(&mut self) -> &mut PeakMap {
        self.statistics.invalidate();
        &mut self.peaks
    }

    pub fn add_peak(&mut self, peak: Peak) -> Option<Peak> {
        self.peaks_mut().insert(peak)
    }

    pub fn set_peaks(&mut self, peaks: PeakMap) {
        self.statistics.invalidate();
        self.peaks = peaks;
    }

    pub fn into_peaks(self) -> PeakMap {
        self.peaks
    }

    pub fn summary(&self) -> &SpectrumSummary {
        self.statistics.summary(&self.peaks)
    }

    pub fn total_intensity(&self) -> f64 {
        self.summary().total_intensity
    }

    pub fn max_intensity(&self) -> f64 {
        self.summary().max_intensity
    }

    pub fn min_mz(&self) -> f64 {
        self.summary().mz_range.0
    }

    pub fn max_mz(&self) -> f64 {
        self.summary().mz_range.1
    }

    /// The peaks' m/z values in ascending order
    pub fn mz_array(&self) -> &[f64] {
        self.statistics.mz_array(&self.peaks)
    }

    /// The peaks' intensities in ascending order
    pub fn sorted_intensities(&self) -> &[f64] {
        self.statistics.sorted_intensities(&self.peaks)
    }

    /// The intensity below which `fraction` of the peaks fall. `fraction` is
    /// clamped to `[0, 1]`; an empty spectrum gives `0.0`.
    pub fn intensity_limit(&self, fraction: f64) -> f64 {
        let intensities = self.sorted_intensities();
        if intensities.is_empty() {
            return 0.0;
        }
        let n = intensities.len();
        let i = ((n as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
        intensities[i.min(n - 1)]
    }

    /// The log-intensity noise model of the spectrum, `None` if there are no
    /// positive intensities
    pub fn log_intensity_distribution(&self) -> Option<&LogIntensityDistribution> {
        self.statistics.log_distribution(&self.peaks)
    }

    #[cfg(test)]
    pub(crate) fn has_memoized_statistics(&self) -> bool {
        self.statistics.is_populated()
    }
}
