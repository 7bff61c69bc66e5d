use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpectrumCacheError;

/// The separator between the file name and the title in a joined spectrum key
pub const KEY_SEPARATOR: &str = "_cus_";

/// Identifies a spectrum by the name of the file it was read from and its title
/// within that file.
///
/// The joined form `<file>_cus_<title>` is accepted and produced by
/// [`FromStr`] and [`Display`] for interchange with tools that key spectra by a
/// single string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpectrumKey {
    pub file: String,
    pub title: String,
}

impl SpectrumKey {
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
        }
    }

    /// Split a joined key at the first separator. Returns `None` if there is no
    /// separator.
    pub fn from_joined(joined: &str) -> Option<Self> {
        joined
            .split_once(KEY_SEPARATOR)
            .map(|(file, title)| Self::new(file, title))
    }

    pub fn joined(&self) -> String {
        format!("{}{KEY_SEPARATOR}{}", self.file, self.title)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Display for SpectrumKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.file, self.title)
    }
}

impl FromStr for SpectrumKey {
    type Err = SpectrumCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_joined(s).ok_or_else(|| {
            SpectrumCacheError::PreconditionViolation(format!(
                "{s:?} does not contain the key separator {KEY_SEPARATOR:?}"
            ))
        })
    }
}

impl<F: Into<String>, T: Into<String>> From<(F, T)> for SpectrumKey {
    fn from(value: (F, T)) -> Self {
        Self::new(value.0, value.1)
    }
}
