//! Reading mass spectrometry data files record-by-record, and indexing them for
//! random access.
//!
//! Each supported format provides a reader implementing [`SpectrumRecordSource`],
//! which [`FileIndex`] uses to scan a file once and the cache uses to read single
//! records at the offsets the scan recorded.

mod infer_format;
pub mod mgf;
pub mod mzml;
mod offset_index;
mod retry;
pub(crate) mod traits;
mod utils;

pub use crate::io::infer_format::{
    infer_from_path, infer_from_stream, open_record_source, open_record_source_as,
    BoxedRecordSource, MassSpectrometryFormat,
};

#[cfg(feature = "mgf")]
pub use crate::io::mgf::{MGFError, MGFRecordReader};

#[cfg(feature = "mzml")]
pub use crate::io::mzml::{MzMLError, MzMLRecordReader};

pub use crate::io::offset_index::{
    FileIndex, FileIndexEntry, IndexStatistics, INDEX_FORMAT_VERSION,
};
pub use crate::io::retry::{RetryError, RetryPolicy};
pub use crate::io::traits::{RecordError, SeekRead, SpectrumRecordSource};
pub use crate::io::utils::{
    file_name_of, index_file_name, last_modified_millis, DetailLevel, INDEX_FILE_EXTENSION,
};
