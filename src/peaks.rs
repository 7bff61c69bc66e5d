pub mod peak;
pub mod peak_set;

pub use crate::peaks::peak::Peak;
pub use crate::peaks::peak_set::{PeakIter, PeakMap};
