use std::fmt::{self, Display};
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::neutral_mass;

/// The polarity of an ion's charge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeSign {
    #[default]
    Positive,
    Negative,
    Neutral,
}

impl ChargeSign {
    pub const fn as_char(&self) -> Option<char> {
        match self {
            Self::Positive => Some('+'),
            Self::Negative => Some('-'),
            Self::Neutral => None,
        }
    }

    pub const fn factor(&self) -> i32 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
            Self::Neutral => 0,
        }
    }
}

/// A signed number of elementary charges
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Charge {
    pub sign: ChargeSign,
    pub magnitude: u32,
}

impl Charge {
    pub const fn new(sign: ChargeSign, magnitude: u32) -> Self {
        Self { sign, magnitude }
    }

    pub const fn positive(magnitude: u32) -> Self {
        Self::new(ChargeSign::Positive, magnitude)
    }

    pub const fn negative(magnitude: u32) -> Self {
        Self::new(ChargeSign::Negative, magnitude)
    }

    /// The signed charge value
    pub fn value(&self) -> i32 {
        self.sign.factor() * self.magnitude as i32
    }

    /// Render the charge as a run of sign characters, `"++"` for a 2+ ion. A
    /// single charge renders as the empty string.
    pub fn formatted(&self) -> String {
        if self.magnitude == 1 {
            return String::new();
        }
        match self.sign.as_char() {
            Some(c) => std::iter::repeat(c).take(self.magnitude as usize).collect(),
            None => String::new(),
        }
    }
}

impl Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sign.as_char() {
            Some(c) => write!(f, "{}{}", self.magnitude, c),
            None => write!(f, "{}", self.magnitude),
        }
    }
}

impl From<i32> for Charge {
    fn from(value: i32) -> Self {
        let sign = match value.signum() {
            1 => ChargeSign::Positive,
            -1 => ChargeSign::Negative,
            _ => ChargeSign::Neutral,
        };
        Self::new(sign, value.unsigned_abs())
    }
}

impl From<Charge> for i32 {
    fn from(value: Charge) -> Self {
        value.value()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChargeParseError {
    #[error("Empty charge string")]
    Empty,
    #[error("Charge {0:?} carries two signs")]
    DoubleSign(String),
    #[error("Could not parse charge {0:?}: {1}")]
    InvalidNumber(String, #[source] ParseIntError),
}

impl FromStr for Charge {
    type Err = ChargeParseError;

    /// Parses `2+`, `3-`, `+2`, `-1` or a bare `2` (positive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChargeParseError::Empty);
        }
        let (tail_sign, body) = if let Some(stripped) = s.strip_suffix('+') {
            (Some(1), stripped)
        } else if let Some(stripped) = s.strip_suffix('-') {
            (Some(-1), stripped)
        } else {
            (None, s)
        };
        if tail_sign.is_some() && (body.starts_with('-') || body.starts_with('+')) {
            return Err(ChargeParseError::DoubleSign(s.to_string()));
        }
        let z: i32 = body
            .parse()
            .map_err(|e| ChargeParseError::InvalidNumber(s.to_string(), e))?;
        Ok(Charge::from(tail_sign.unwrap_or(1) * z))
    }
}

/// Parse a list of charges as found in MGF `CHARGE` headers, e.g. `2+ and 3+`
/// or `2+,3+`
pub fn parse_charge_list(value: &str) -> Result<Vec<Charge>, ChargeParseError> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("and"))
        .map(|t| t.parse())
        .collect()
}

/// The parent ion selected for fragmentation to produce an MSn spectrum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    /// The selected ion's m/z
    pub mz: f64,
    /// The retention time the precursor was observed at, in seconds
    pub rt: f64,
    /// The precursor's intensity, `0.0` if not reported
    pub intensity: f64,
    /// The charge states the precursor may carry. May be empty.
    pub charges: Vec<Charge>,
}

impl Precursor {
    pub fn new(mz: f64, rt: f64, intensity: f64, charges: Vec<Charge>) -> Self {
        Self {
            mz,
            rt,
            intensity,
            charges,
        }
    }

    /// The neutral mass of the precursor if it carried `charge`
    pub fn mass<C: Into<Charge>>(&self, charge: C) -> f64 {
        let charge: Charge = charge.into();
        neutral_mass(self.mz, charge.value())
    }

    /// The neutral masses implied by each of the possible charges
    pub fn possible_masses(&self) -> impl Iterator<Item = (Charge, f64)> + '_ {
        self.charges.iter().map(|z| (*z, self.mass(*z)))
    }

    pub fn has_charge(&self) -> bool {
        !self.charges.is_empty()
    }

    /// The charges rendered the way MGF `CHARGE` headers list them
    pub fn charges_as_string(&self) -> String {
        self.charges
            .iter()
            .map(|z| z.to_string())
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::PROTON;

    #[test]
    fn test_charge_formatting() {
        assert_eq!(Charge::positive(1).formatted(), "");
        assert_eq!(Charge::positive(2).formatted(), "++");
        assert_eq!(Charge::negative(3).formatted(), "---");
        assert_eq!(Charge::negative(1).to_string(), "1-");
        assert_eq!(Charge::positive(2).to_string(), "2+");
        assert_eq!(Charge::from(0).to_string(), "0");
    }

    #[test]
    fn test_charge_parsing() {
        assert_eq!("2+".parse::<Charge>().unwrap(), Charge::positive(2));
        assert_eq!("3-".parse::<Charge>().unwrap(), Charge::negative(3));
        assert_eq!("+1".parse::<Charge>().unwrap(), Charge::positive(1));
        assert_eq!("-2".parse::<Charge>().unwrap(), Charge::negative(2));
        assert_eq!("4".parse::<Charge>().unwrap(), Charge::positive(4));
        assert!("+2-".parse::<Charge>().is_err());
        assert!("x".parse::<Charge>().is_err());

        let charges = parse_charge_list("2+ and 3+").unwrap();
        assert_eq!(charges, vec![Charge::positive(2), Charge::positive(3)]);
        let charges = parse_charge_list("2+,3+").unwrap();
        assert_eq!(charges.len(), 2);
    }

    #[test]
    fn test_precursor_mass() {
        let precursor = Precursor::new(500.0, 60.0, 0.0, vec![Charge::positive(2)]);
        let mass = precursor.mass(2);
        assert!((mass - (1000.0 - 2.0 * PROTON)).abs() < 1e-9);
        assert_eq!(precursor.possible_masses().count(), 1);
        assert_eq!(precursor.charges_as_string(), "2+");
    }
}
