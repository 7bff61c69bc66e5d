use std::cmp;
use std::fmt;
use std::hash;

use serde::{Deserialize, Serialize};

/// A single intensity measurement at a mass-over-charge coordinate.
///
/// Equality, hashing and ordering compare the bit patterns of the fields, so
/// two peaks are equal only if every field is exactly identical. Ordering is
/// by m/z, then intensity, then retention time, using [`f64::total_cmp`].
#[derive(Default, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
    pub rt: f64,
}

impl Peak {
    pub fn new(mz: f64, intensity: f64, rt: f64) -> Self {
        Self { mz, intensity, rt }
    }

    /// Compare two peaks by ascending intensity
    pub fn intensity_ascending(a: &Peak, b: &Peak) -> cmp::Ordering {
        a.intensity.total_cmp(&b.intensity)
    }

    /// Compare two peaks by descending intensity
    pub fn intensity_descending(a: &Peak, b: &Peak) -> cmp::Ordering {
        b.intensity.total_cmp(&a.intensity)
    }

    /// Compare two peaks by ascending m/z
    pub fn mz_ascending(a: &Peak, b: &Peak) -> cmp::Ordering {
        a.mz.total_cmp(&b.mz)
    }

    #[inline]
    fn bits(&self) -> (u64, u64, u64) {
        (
            self.mz.to_bits(),
            self.intensity.to_bits(),
            self.rt.to_bits(),
        )
    }
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Peak({}, {}, {})", self.mz, self.intensity, self.rt)
    }
}

impl hash::Hash for Peak {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl cmp::PartialEq<Peak> for Peak {
    fn eq(&self, other: &Peak) -> bool {
        self.bits() == other.bits()
    }
}

impl cmp::Eq for Peak {}

impl cmp::PartialOrd<Peak> for Peak {
    fn partial_cmp(&self, other: &Peak) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Peak {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Self::mz_ascending(self, other)
            .then_with(|| Self::intensity_ascending(self, other))
            .then_with(|| self.rt.total_cmp(&other.rt))
    }
}

impl From<(f64, f64)> for Peak {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1, 0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exact_equality() {
        let a = Peak::new(100.0, 50.0, 12.5);
        let b = Peak::new(100.0, 50.0, 12.5);
        let c = Peak::new(100.0 + f64::EPSILON * 100.0, 50.0, 12.5);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);

        // Bit-exact comparison distinguishes signed zeros and equates NaNs
        assert_ne!(Peak::new(0.0, 1.0, 0.0), Peak::new(-0.0, 1.0, 0.0));
        assert_eq!(Peak::new(f64::NAN, 1.0, 0.0), Peak::new(f64::NAN, 1.0, 0.0));
    }

    #[test]
    fn test_comparators() {
        let mut peaks = vec![
            Peak::new(300.0, 10.0, 0.0),
            Peak::new(100.0, 30.0, 0.0),
            Peak::new(200.0, 20.0, 0.0),
        ];
        peaks.sort_by(Peak::intensity_descending);
        assert_eq!(peaks[0].mz, 100.0);
        peaks.sort_by(Peak::intensity_ascending);
        assert_eq!(peaks[0].mz, 300.0);
        peaks.sort_by(Peak::mz_ascending);
        let mzs: Vec<f64> = peaks.iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![100.0, 200.0, 300.0]);
    }
}
