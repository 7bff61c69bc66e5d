//! Group precursor masses into tolerance-wide bins for fast lookup of every
//! candidate within tolerance of a query mass.
//!
//! With an absolute tolerance the bins are `tolerance` Daltons wide. With a
//! relative tolerance the bins are equally wide on a log scale, each spanning the
//! same number of parts-per-million of its mass. In both cases every candidate
//! within tolerance of a query lies in the query's bin or one of its two
//! neighbours.
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use log::trace;
use ordered_float::OrderedFloat;

use crate::cache::SpectrumKey;
use crate::error::{Result, SpectrumCacheError};
use crate::mass_error::Tolerance;
use crate::spectrum::{Charge, Precursor};
use crate::utils::neutral_mass;

/// The mass relative bins are measured from
const PPM_ANCHOR_MASS: f64 = 1000.0;

/// How close to an integer a bin quotient must be to be treated as that integer
const BIN_SNAP_EPSILON: f64 = 1e-9;

/// One precursor at one charge state
#[derive(Debug, Clone, PartialEq)]
pub struct PrecursorMatch {
    pub key: SpectrumKey,
    pub charge: Charge,
    /// The neutral mass implied by `charge`
    pub mass: f64,
    pub precursor_mz: f64,
}

/// A fixed table of precursor masses binned by tolerance
#[derive(Debug, Clone)]
pub struct PrecursorBinner {
    tolerance: Tolerance,
    charges: RangeInclusive<i32>,
    /// `ln((1e6 - tol) / (1e6 + tol))`, used only for relative tolerances
    log_scale: f64,
    bins: BTreeMap<i64, BTreeMap<OrderedFloat<f64>, Vec<PrecursorMatch>>>,
    len: usize,
}

fn floor_with_snap(quotient: f64) -> i64 {
    let nearest = quotient.round();
    if (quotient - nearest).abs() <= BIN_SNAP_EPSILON {
        nearest as i64
    } else {
        quotient.floor() as i64
    }
}

impl PrecursorBinner {
    /// Bin every `(key, precursor)` pair at each charge in `charges`. Charge zero
    /// is skipped.
    pub fn new<I>(candidates: I, tolerance: Tolerance, charges: RangeInclusive<i32>) -> Result<Self>
    where
        I: IntoIterator<Item = (SpectrumKey, Precursor)>,
    {
        let width = tolerance.value();
        if !(width.is_finite() && width > 0.0) {
            return Err(SpectrumCacheError::PreconditionViolation(format!(
                "The binning tolerance must be positive, got {tolerance}"
            )));
        }
        let log_scale = match tolerance {
            Tolerance::PPM(tol) => {
                if tol >= 1e6 {
                    return Err(SpectrumCacheError::PreconditionViolation(format!(
                        "A relative binning tolerance must be below 1e6 PPM, got {tolerance}"
                    )));
                }
                ((1e6 - tol) / (1e6 + tol)).ln()
            }
            Tolerance::Da(_) => 0.0,
        };

        let mut this = Self {
            tolerance,
            charges: charges.clone(),
            log_scale,
            bins: BTreeMap::new(),
            len: 0,
        };

        for (key, precursor) in candidates {
            for z in charges.clone() {
                if z == 0 {
                    continue;
                }
                let mass = precursor.mass(z);
                if !(mass.is_finite() && mass > 0.0) {
                    trace!("Skipping {key} at charge {z} with mass {mass}");
                    continue;
                }
                this.insert(PrecursorMatch {
                    key: key.clone(),
                    charge: Charge::from(z),
                    mass,
                    precursor_mz: precursor.mz,
                });
            }
        }
        Ok(this)
    }

    fn insert(&mut self, candidate: PrecursorMatch) {
        let bin = self.bin(candidate.mass);
        self.bins
            .entry(bin)
            .or_default()
            .entry(OrderedFloat(candidate.mass))
            .or_default()
            .push(candidate);
        self.len += 1;
    }

    /// The bin `mass` falls in
    pub fn bin(&self, mass: f64) -> i64 {
        match self.tolerance {
            Tolerance::Da(tol) => floor_with_snap(mass / tol),
            Tolerance::PPM(_) => {
                floor_with_snap((mass.ln() - PPM_ANCHOR_MASS.ln()) / self.log_scale)
            }
        }
    }

    /// A representative mass of `bin`: the center of an absolute bin, or the
    /// boundary a relative bin begins at
    pub fn bin_to_mass(&self, bin: i64) -> f64 {
        match self.tolerance {
            Tolerance::Da(tol) => tol * (bin as f64 + 0.5),
            Tolerance::PPM(_) => (self.log_scale * bin as f64 + PPM_ANCHOR_MASS.ln()).exp(),
        }
    }

    /// Every candidate within tolerance of `reference_mass`, ordered by mass
    pub fn query(&self, reference_mass: f64) -> Result<Vec<&PrecursorMatch>> {
        if self.tolerance.is_ppm() && !(reference_mass > 0.0) {
            return Err(SpectrumCacheError::PreconditionViolation(format!(
                "A relative tolerance query needs a positive reference mass, got {reference_mass}"
            )));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let center = self.bin(reference_mass);
        let mut matches: Vec<&PrecursorMatch> = (center.saturating_sub(1)..=center.saturating_add(1))
            .filter_map(|bin| self.bins.get(&bin))
            .flat_map(|masses| masses.values().flatten())
            .filter(|candidate| self.tolerance.test(candidate.mass, reference_mass))
            .collect();
        matches.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        Ok(matches)
    }

    /// Every candidate within tolerance of the neutral mass of `mz` at `charge`
    pub fn query_mz(&self, mz: f64, charge: i32) -> Result<Vec<&PrecursorMatch>> {
        if charge == 0 {
            return Err(SpectrumCacheError::PreconditionViolation(
                "Cannot compute the mass of an uncharged m/z".into(),
            ));
        }
        self.query(neutral_mass(mz, charge))
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn charges(&self) -> &RangeInclusive<i32> {
        &self.charges
    }

    /// The number of binned candidates, counting each charge state separately
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// The smallest and largest binned masses
    pub fn mass_range(&self) -> Option<(f64, f64)> {
        let mut lowest = f64::INFINITY;
        let mut highest = f64::NEG_INFINITY;
        for masses in self.bins.values() {
            if let (Some((lo, _)), Some((hi, _))) = (masses.first_key_value(), masses.last_key_value())
            {
                lowest = lowest.min(lo.0);
                highest = highest.max(hi.0);
            }
        }
        (lowest <= highest).then_some((lowest, highest))
    }

    /// Iterate over every candidate in bin order
    pub fn iter(&self) -> impl Iterator<Item = &PrecursorMatch> + '_ {
        self.bins
            .values()
            .flat_map(|masses| masses.values().flatten())
    }
}
