use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A mass matching tolerance, either an absolute width in Daltons or a relative
/// width in parts-per-million of the reference mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    Da(f64),
    PPM(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::PPM(10.0)
    }
}

impl Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Da(tol) => write!(f, "{tol}Da"),
            Self::PPM(tol) => write!(f, "{tol}PPM"),
        }
    }
}

impl Tolerance {
    /// The width of the tolerance, in whichever unit it is expressed in
    pub fn value(&self) -> f64 {
        match self {
            Self::Da(tol) | Self::PPM(tol) => *tol,
        }
    }

    pub fn is_ppm(&self) -> bool {
        matches!(self, Self::PPM(_))
    }

    /// The signed error of `query` relative to `reference`, in this tolerance's unit
    #[inline]
    pub fn error(&self, query: f64, reference: f64) -> f64 {
        match self {
            Self::Da(_) => query - reference,
            Self::PPM(_) => (query - reference) / reference * 1e6,
        }
    }

    /// Check whether `query` is within tolerance of `reference`
    #[inline]
    pub fn test(&self, query: f64, reference: f64) -> bool {
        self.error(query, reference).abs() <= self.value()
    }

    /// The inclusive mass interval around `reference` that passes [`Tolerance::test`]
    pub fn bounds(&self, reference: f64) -> (f64, f64) {
        match self {
            Self::Da(tol) => (reference - tol, reference + tol),
            Self::PPM(tol) => {
                let width = reference * tol / 1e6;
                (reference - width, reference + width)
            }
        }
    }
}
