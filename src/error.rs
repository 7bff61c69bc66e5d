use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::SpectrumKey;
use crate::io::RecordError;

/// All the ways indexing, caching and retrieving a spectrum can fail
#[derive(Debug, Error)]
pub enum SpectrumCacheError {
    /// The source file could not be opened or inspected
    #[error("The file {path} could not be read: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A spectrum was requested from a file that was never registered
    #[error("The file {0} has not been registered")]
    FileNotRegistered(String),
    /// The title is not in the file's index, even after normalization
    #[error("The spectrum {title:?} was not found in {file}")]
    SpectrumNotFound { file: String, title: String },
    /// The file's extension does not name a supported format
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// A record was read with retries until the retry timeout elapsed
    #[error("Failed to read {title:?} from {file} after {attempts} attempts: {source}")]
    RetriesExhausted {
        file: String,
        title: String,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    /// A record was read but could not be parsed
    #[error("The record {title:?} in {file} is malformed: {source}")]
    Malformed {
        file: String,
        title: String,
        #[source]
        source: RecordError,
    },
    /// A record without a title was found while building an index
    #[error("The record at byte {offset} in {file} has no title")]
    MissingTitle { file: String, offset: u64 },
    /// A precursor was requested for a spectrum that has none
    #[error("The spectrum {0} has no precursor")]
    NoPrecursor(SpectrumKey),
    /// A caller supplied an argument outside of the operation's domain
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),
    /// An I/O error while scanning a file to build its index
    #[error("An I/O error occurred: {0}")]
    Io(
        #[from]
        #[source]
        io::Error,
    ),
}

impl SpectrumCacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. } | Self::FileNotRegistered(_) | Self::SpectrumNotFound { .. }
        )
    }
}

impl From<SpectrumCacheError> for io::Error {
    fn from(value: SpectrumCacheError) -> Self {
        match value {
            SpectrumCacheError::Io(e) => e,
            SpectrumCacheError::FileNotFound { ref source, .. } => {
                io::Error::new(source.kind(), value)
            }
            SpectrumCacheError::RetriesExhausted { ref source, .. } => {
                io::Error::new(source.kind(), value)
            }
            SpectrumCacheError::FileNotRegistered(_) | SpectrumCacheError::SpectrumNotFound { .. } => {
                io::Error::new(io::ErrorKind::NotFound, value)
            }
            SpectrumCacheError::UnsupportedFormat(_) => {
                io::Error::new(io::ErrorKind::Unsupported, value)
            }
            SpectrumCacheError::PreconditionViolation(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type Result<T, E = SpectrumCacheError> = std::result::Result<T, E>;
