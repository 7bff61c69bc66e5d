use std::collections::btree_map::{self, BTreeMap};
use std::iter::FromIterator;

use ordered_float::OrderedFloat;

use super::peak::Peak;

/// An m/z-ordered mapping from m/z to [`Peak`]. Each m/z holds at most one peak,
/// inserting a peak at an m/z already present replaces the earlier peak.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakMap {
    peaks: BTreeMap<OrderedFloat<f64>, Peak>,
}

impl PeakMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `peak`, returning the peak it displaced, if any
    pub fn insert(&mut self, peak: Peak) -> Option<Peak> {
        self.peaks.insert(OrderedFloat(peak.mz), peak)
    }

    pub fn get(&self, mz: f64) -> Option<&Peak> {
        self.peaks.get(&OrderedFloat(mz))
    }

    pub fn remove(&mut self, mz: f64) -> Option<Peak> {
        self.peaks.remove(&OrderedFloat(mz))
    }

    pub fn contains_mz(&self, mz: f64) -> bool {
        self.peaks.contains_key(&OrderedFloat(mz))
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn clear(&mut self) {
        self.peaks.clear()
    }

    /// Iterate over the peaks in ascending m/z order
    pub fn iter(&self) -> PeakIter<'_> {
        PeakIter {
            inner: self.peaks.values(),
        }
    }

    /// The peaks whose m/z falls within `low..=high`
    pub fn between(&self, low: f64, high: f64) -> impl Iterator<Item = &Peak> + '_ {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.peaks
            .range(OrderedFloat(low)..=OrderedFloat(high))
            .map(|(_, p)| p)
    }

    pub fn first(&self) -> Option<&Peak> {
        self.peaks.values().next()
    }

    pub fn last(&self) -> Option<&Peak> {
        self.peaks.values().next_back()
    }
}

/// An iterator over the peaks of a [`PeakMap`] in ascending m/z order
pub struct PeakIter<'a> {
    inner: btree_map::Values<'a, OrderedFloat<f64>, Peak>,
}

impl<'a> Iterator for PeakIter<'a> {
    type Item = &'a Peak;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for PeakIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for PeakIter<'_> {}

impl<'a> IntoIterator for &'a PeakMap {
    type Item = &'a Peak;
    type IntoIter = PeakIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Peak> for PeakMap {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl Extend<Peak> for PeakMap {
    fn extend<T: IntoIterator<Item = Peak>>(&mut self, iter: T) {
        for peak in iter {
            self.insert(peak);
        }
    }
}
