use std::{
    fmt::Display,
    io::{self, prelude::*},
    path::Path,
};

use serde::{Deserialize, Serialize};

#[cfg(feature = "mgf")]
use crate::io::mgf::is_mgf;

#[cfg(feature = "mzml")]
use crate::io::mzml::is_mzml;

/// Mass spectrometry file formats that [`mzcache`](crate) can index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassSpectrometryFormat {
    MGF,
    MzML,
    Unknown,
}

impl MassSpectrometryFormat {
    pub fn is_supported(&self) -> bool {
        match self {
            #[cfg(feature = "mgf")]
            Self::MGF => true,
            #[cfg(feature = "mzml")]
            Self::MzML => true,
            _ => false,
        }
    }
}

impl Display for MassSpectrometryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Given a path, infer the file format from its extension, ignoring case
pub fn infer_from_path<P: AsRef<Path>>(path: P) -> MassSpectrometryFormat {
    let path = path.as_ref();
    if let Some(ext) = path.extension() {
        if let Some(ext) = ext.to_ascii_lowercase().to_str() {
            match ext {
                "mzml" => MassSpectrometryFormat::MzML,
                "mgf" => MassSpectrometryFormat::MGF,
                _ => MassSpectrometryFormat::Unknown,
            }
        } else {
            MassSpectrometryFormat::Unknown
        }
    } else {
        MassSpectrometryFormat::Unknown
    }
}

/// Given a stream of bytes, infer the file format from its first bytes. The
/// stream is returned to its starting position.
pub fn infer_from_stream<R: Read + Seek>(stream: &mut R) -> io::Result<MassSpectrometryFormat> {
    // Enough bytes to span an XML declaration plus the opening root tag
    let mut buf = vec![0u8; 500];
    let current_pos = stream.stream_position()?;
    let bytes_read = stream.read(buf.as_mut_slice())?;
    buf.truncate(bytes_read);
    stream.seek(io::SeekFrom::Start(current_pos))?;

    match &buf {
        #[cfg(feature = "mzml")]
        _ if is_mzml(&buf) => Ok(MassSpectrometryFormat::MzML),
        #[cfg(feature = "mgf")]
        _ if is_mgf(&buf) => Ok(MassSpectrometryFormat::MGF),
        _ => Ok(MassSpectrometryFormat::Unknown),
    }
}
