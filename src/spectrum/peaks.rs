use std::sync::OnceLock;

use crate::peaks::{Peak, PeakMap};

/// A set of common summary metrics describing a mass spectrum
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SpectrumSummary {
    /// The total ion current for a spectrum
    pub total_intensity: f64,
    /// The most intense peak's intensity
    pub max_intensity: f64,
    /// The minimum and maximum m/z observed
    pub mz_range: (f64, f64),
    /// The number of peaks in the spectrum
    pub count: usize,
}

impl SpectrumSummary {
    pub fn from_peaks(peaks: &PeakMap) -> Self {
        let mz_range = match (peaks.first(), peaks.last()) {
            (Some(first), Some(last)) => (first.mz, last.mz),
            _ => (0.0, 0.0),
        };
        let (total_intensity, max_intensity) = peaks
            .iter()
            .fold((0.0, 0.0), |(tic, max): (f64, f64), p: &Peak| {
                (tic + p.intensity, max.max(p.intensity))
            });
        Self {
            total_intensity,
            max_intensity,
            mz_range,
            count: peaks.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A non-symmetrical normal approximation of the `log10` intensity
/// distribution of a spectrum's peaks, used to estimate the noise level.
///
/// The spread above and below the median is estimated separately from the
/// 84.1st and 15.9th percentiles, which sit one standard deviation away from
/// the median of a normal distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogIntensityDistribution {
    pub median: f64,
    pub std_up: f64,
    pub std_down: f64,
}

impl LogIntensityDistribution {
    /// Estimate the distribution from ascending-sorted intensities. Non-positive
    /// intensities have no logarithm and are skipped.
    pub fn from_sorted_intensities(intensities: &[f64]) -> Option<Self> {
        let logs: Vec<f64> = intensities
            .iter()
            .filter(|i| **i > 0.0)
            .map(|i| i.log10())
            .collect();
        if logs.is_empty() {
            return None;
        }
        let median = percentile_of_sorted(&logs, 0.5);
        let std_up = percentile_of_sorted(&logs, 0.841) - median;
        let std_down = median - percentile_of_sorted(&logs, 0.159);
        Some(Self {
            median,
            std_up,
            std_down,
        })
    }

    /// How many standard deviations `intensity` is from the median, in log space
    pub fn z_score(&self, intensity: f64) -> f64 {
        let x = intensity.log10();
        let delta = x - self.median;
        let std = if delta >= 0.0 {
            self.std_up
        } else {
            self.std_down
        };
        if std == 0.0 {
            return if delta == 0.0 { 0.0 } else { delta.signum() * f64::INFINITY };
        }
        delta / std
    }

    /// The intensity `z` standard deviations from the median
    pub fn intensity_at(&self, z: f64) -> f64 {
        let std = if z >= 0.0 { self.std_up } else { self.std_down };
        10f64.powf(self.median + z * std)
    }
}

/// Linear interpolation between the closest ranks of an ascending-sorted slice
pub(crate) fn percentile_of_sorted(values: &[f64], fraction: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let position = fraction * (values.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let weight = position - lo as f64;
    values[lo] + (values[hi] - values[lo]) * weight
}

/// Lazily computed, memoized values derived from a spectrum's peaks. Each slot is
/// filled at most once, the first reader computes it while later readers wait on
/// the slot's own lock and never recompute.
#[derive(Debug, Default, Clone)]
pub(crate) struct PeakStatistics {
    summary: OnceLock<SpectrumSummary>,
    mz_array: OnceLock<Vec<f64>>,
    intensity_array: OnceLock<Vec<f64>>,
    log_distribution: OnceLock<Option<LogIntensityDistribution>>,
}

impl PeakStatistics {
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn summary(&self, peaks: &PeakMap) -> &SpectrumSummary {
        self.summary.get_or_init(|| SpectrumSummary::from_peaks(peaks))
    }

    pub fn mz_array(&self, peaks: &PeakMap) -> &[f64] {
        self.mz_array
            .get_or_init(|| peaks.iter().map(|p| p.mz).collect())
    }

    pub fn sorted_intensities(&self, peaks: &PeakMap) -> &[f64] {
        self.intensity_array.get_or_init(|| {
            let mut intensities: Vec<f64> = peaks.iter().map(|p| p.intensity).collect();
            intensities.sort_by(f64::total_cmp);
            intensities
        })
    }

    pub fn log_distribution(&self, peaks: &PeakMap) -> Option<&LogIntensityDistribution> {
        self.log_distribution
            .get_or_init(|| {
                LogIntensityDistribution::from_sorted_intensities(self.sorted_intensities(peaks))
            })
            .as_ref()
    }

    #[cfg(test)]
    pub fn is_populated(&self) -> bool {
        self.summary.get().is_some()
            || self.mz_array.get().is_some()
            || self.intensity_array.get().is_some()
            || self.log_distribution.get().is_some()
    }
}
