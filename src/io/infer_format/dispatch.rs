use std::{fs, path::Path};

use crate::error::{Result, SpectrumCacheError};
use crate::io::traits::SpectrumRecordSource;
use crate::io::utils::file_name_of;

#[cfg(feature = "mgf")]
use crate::io::mgf::MGFRecordReader;
#[cfg(feature = "mzml")]
use crate::io::mzml::MzMLRecordReader;

use super::inference::{infer_from_path, MassSpectrometryFormat};

/// A type-erased record reader over an open file
pub type BoxedRecordSource = Box<dyn SpectrumRecordSource + Send>;

/// Open the file at `path` with the record reader for `format`. Spectra read
/// through it are labelled with the file's name.
pub fn open_record_source_as(
    path: &Path,
    format: MassSpectrometryFormat,
) -> Result<BoxedRecordSource> {
    if !format.is_supported() {
        return Err(SpectrumCacheError::UnsupportedFormat(
            path.display().to_string(),
        ));
    }
    let source_file = file_name_of(path).unwrap_or_default();
    let handle = fs::File::open(path).map_err(|source| SpectrumCacheError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let reader: BoxedRecordSource = match format {
        #[cfg(feature = "mgf")]
        MassSpectrometryFormat::MGF => Box::new(MGFRecordReader::new(handle, source_file)),
        #[cfg(feature = "mzml")]
        MassSpectrometryFormat::MzML => Box::new(MzMLRecordReader::new(handle, source_file)),
        _ => {
            return Err(SpectrumCacheError::UnsupportedFormat(
                path.display().to_string(),
            ))
        }
    };
    Ok(reader)
}

/// Open the file at `path`, choosing the record reader by the file's extension
pub fn open_record_source(path: &Path) -> Result<(MassSpectrometryFormat, BoxedRecordSource)> {
    let format = infer_from_path(path);
    let reader = open_record_source_as(path, format)?;
    Ok((format, reader))
}
