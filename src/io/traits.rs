use std::io::{self, Read, Seek};
use std::sync::atomic::AtomicBool;

use thiserror::Error;

#[cfg(feature = "mgf")]
use crate::io::mgf::MGFError;
#[cfg(feature = "mzml")]
use crate::io::mzml::MzMLError;
use crate::io::offset_index::FileIndexEntry;
use crate::spectrum::{Precursor, Spectrum};

/// A stream that supports both reading and seeking, the minimum needed for
/// random access by byte offset
pub trait SeekRead: Read + Seek {}
impl<T: Read + Seek> SeekRead for T {}

/// The failure of a single attempt to read one record
#[derive(Debug, Error)]
pub enum RecordError {
    /// The underlying stream failed. These errors may be transient and are
    /// worth retrying.
    #[error("An I/O error occurred while reading a record: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[cfg(feature = "mgf")]
    #[error(transparent)]
    MGF(#[from] MGFError),
    #[cfg(feature = "mzml")]
    #[error(transparent)]
    MzML(#[from] MzMLError),
    /// No record begins at the requested offset
    #[error("No record was found at byte offset {0}")]
    NoRecordAt(u64),
    /// The record at the offset is not the one it was indexed as
    #[error("Expected {expected} at byte offset {offset}, found {found}")]
    UnexpectedRecord {
        offset: u64,
        expected: String,
        found: String,
    },
    /// A record without a title was found while scanning
    #[error("The record at byte offset {0} has no title")]
    MissingTitle(u64),
}

impl RecordError {
    /// Whether the failure came from the stream rather than from the content
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IOError(_))
    }

    /// Whether the offset read from did not hold the expected record, as when the
    /// file changed after it was indexed
    pub fn is_misplaced(&self) -> bool {
        matches!(self, Self::NoRecordAt(_) | Self::UnexpectedRecord { .. })
    }
}

/// A source of spectrum records that can be scanned once to build an index and
/// then read record-by-record at the byte offsets that scan produced.
///
/// Every read is a single attempt, retrying is up to the caller. Implementors
/// hold one open handle and are not safe to read from concurrently, callers
/// must serialize access.
pub trait SpectrumRecordSource {
    /// Scan the whole source from the beginning, producing one entry per record in
    /// the order they occur. `cancel` is checked between records, and if it is set
    /// the scan stops and `Ok(None)` is returned.
    fn scan_entries(&mut self, cancel: &AtomicBool)
        -> Result<Option<Vec<FileIndexEntry>>, RecordError>;

    /// Read and fully decode the spectrum whose record starts at `offset`
    fn read_spectrum_at(&mut self, offset: u64) -> Result<Spectrum, RecordError>;

    /// Read only the precursor of the record starting at `offset`, skipping the
    /// peak data. MS1 records give `Ok(None)`.
    fn read_precursor_at(&mut self, offset: u64) -> Result<Option<Precursor>, RecordError>;
}

impl<T: SpectrumRecordSource + ?Sized> SpectrumRecordSource for Box<T> {
    fn scan_entries(
        &mut self,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<FileIndexEntry>>, RecordError> {
        (**self).scan_entries(cancel)
    }

    fn read_spectrum_at(&mut self, offset: u64) -> Result<Spectrum, RecordError> {
        (**self).read_spectrum_at(offset)
    }

    fn read_precursor_at(&mut self, offset: u64) -> Result<Option<Precursor>, RecordError> {
        (**self).read_precursor_at(offset)
    }
}
