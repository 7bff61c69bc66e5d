use std::io::{self, prelude::*};

use flate2::write::ZlibDecoder;
use quick_xml::events::BytesStart;
use quick_xml::Error as XMLError;
use thiserror::Error;

use crate::io::traits::RecordError;

/**
The states the mzML record parser moves through while reading one `<spectrum>`
element. Only needed by the module consumer to determine where in the
document an error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MzMLParserState {
    Start,
    Spectrum,
    PrecursorList,
    SelectedIon,
    BinaryDataArrayList,
    BinaryDataArray,
    Binary,
    SpectrumDone,
}

/**
All the ways that reading an mzML record can go wrong
*/
#[derive(Debug, Error)]
pub enum MzMLError {
    #[error("An XML error {1} was encountered in {0:?}")]
    XMLError(MzMLParserState, #[source] XMLError),
    #[error("The document ended inside a spectrum, in {0:?}")]
    IncompleteSpectrum(MzMLParserState),
    #[error("Failed to decode a binary data array: {0}")]
    ArrayDecodingError(String),
    #[error("Unsupported binary array setting {0}")]
    UnsupportedArrayEncoding(&'static str),
    #[error("Malformed cvParam value for {accession}: {value:?}")]
    MalformedParam { accession: String, value: String },
    #[error("The spectrum element has no id attribute")]
    MissingId,
    #[error("The m/z and intensity arrays differ in length: {0} vs {1}")]
    ArrayLengthMismatch(usize, usize),
}

/// Convert a quick-xml error into a [`RecordError`], keeping I/O failures
/// distinguishable so they may be retried.
pub(crate) fn xml_error(state: MzMLParserState, error: XMLError) -> RecordError {
    match error {
        XMLError::Io(e) => RecordError::IOError(io::Error::new(e.kind(), e.to_string())),
        e => RecordError::MzML(MzMLError::XMLError(state, e)),
    }
}

// Controlled vocabulary accessions read from mzML
pub(crate) const MS_LEVEL: &str = "MS:1000511";
pub(crate) const SCAN_START_TIME: &str = "MS:1000016";
pub(crate) const SELECTED_ION_MZ: &str = "MS:1000744";
pub(crate) const CHARGE_STATE: &str = "MS:1000041";
pub(crate) const PEAK_INTENSITY: &str = "MS:1000042";
pub(crate) const MZ_ARRAY: &str = "MS:1000514";
pub(crate) const INTENSITY_ARRAY: &str = "MS:1000515";
pub(crate) const FLOAT_32: &str = "MS:1000521";
pub(crate) const FLOAT_64: &str = "MS:1000523";
pub(crate) const ZLIB_COMPRESSION: &str = "MS:1000574";
pub(crate) const NO_COMPRESSION: &str = "MS:1000576";
pub(crate) const UNIT_MINUTE: &str = "UO:0000031";

/// The parts of a `<cvParam>` this crate reads
#[derive(Debug, Default, Clone)]
pub(crate) struct CVParam {
    pub accession: String,
    pub value: String,
    pub unit_accession: Option<String>,
}

impl CVParam {
    pub fn from_element(event: &BytesStart) -> Self {
        let mut param = CVParam::default();
        for attr in event.attributes().flatten() {
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => continue,
            };
            match attr.key.as_ref() {
                b"accession" => param.accession = value,
                b"value" => param.value = value,
                b"unitAccession" => param.unit_accession = Some(value),
                _ => {}
            }
        }
        param
    }

    pub fn parse<T: std::str::FromStr>(&self) -> Result<T, MzMLError> {
        self.value.trim().parse().map_err(|_| MzMLError::MalformedParam {
            accession: self.accession.clone(),
            value: self.value.clone(),
        })
    }

    /// The value of a time parameter, converted to seconds
    pub fn as_seconds(&self) -> Result<f64, MzMLError> {
        let value: f64 = self.parse()?;
        if self.unit_accession.as_deref() == Some(UNIT_MINUTE) {
            Ok(value * 60.0)
        } else {
            Ok(value)
        }
    }
}

/// Read the value of the attribute `name` on `event`, unescaped
pub(crate) fn attribute_value(event: &BytesStart, name: &[u8]) -> Option<String> {
    event
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayRole {
    #[default]
    Unknown,
    MZ,
    Intensity,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayDType {
    Float32,
    #[default]
    Float64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayCompression {
    #[default]
    NoCompression,
    Zlib,
}

/// One `<binaryDataArray>` as it is read, before decoding
#[derive(Debug, Default, Clone)]
pub(crate) struct EncodedArray {
    pub role: ArrayRole,
    pub dtype: ArrayDType,
    pub compression: ArrayCompression,
    pub data: Vec<u8>,
}

impl EncodedArray {
    pub fn fill_param(&mut self, param: &CVParam) {
        match param.accession.as_str() {
            MZ_ARRAY => self.role = ArrayRole::MZ,
            INTENSITY_ARRAY => self.role = ArrayRole::Intensity,
            FLOAT_32 => self.dtype = ArrayDType::Float32,
            FLOAT_64 => self.dtype = ArrayDType::Float64,
            ZLIB_COMPRESSION => self.compression = ArrayCompression::Zlib,
            NO_COMPRESSION => self.compression = ArrayCompression::NoCompression,
            _ => {}
        }
    }

    pub fn decompress_zlib(bytestring: &[u8]) -> Result<Vec<u8>, MzMLError> {
        let mut decompressor = ZlibDecoder::new(Vec::new());
        decompressor
            .write_all(bytestring)
            .and_then(|_| decompressor.finish())
            .map_err(|e| MzMLError::ArrayDecodingError(format!("Decompression error: {e}")))
    }

    /// Base64-decode, decompress and reinterpret the array as `f64` values
    pub fn decode(&self) -> Result<Vec<f64>, MzMLError> {
        if self.data.is_empty() {
            return Ok(Vec::new());
        }
        let bytestring = base64_simd::STANDARD
            .decode_type::<Vec<u8>>(&self.data)
            .map_err(|e| MzMLError::ArrayDecodingError(format!("Failed to decode base64 array: {e}")))?;
        let bytestring = match self.compression {
            ArrayCompression::NoCompression => bytestring,
            ArrayCompression::Zlib => Self::decompress_zlib(&bytestring)?,
        };
        let values = match self.dtype {
            ArrayDType::Float64 => {
                if bytestring.len() % 8 != 0 {
                    return Err(MzMLError::ArrayDecodingError(format!(
                        "{} bytes is not a whole number of 64-bit floats",
                        bytestring.len()
                    )));
                }
                bytemuck::pod_collect_to_vec::<u8, f64>(&bytestring)
            }
            ArrayDType::Float32 => {
                if bytestring.len() % 4 != 0 {
                    return Err(MzMLError::ArrayDecodingError(format!(
                        "{} bytes is not a whole number of 32-bit floats",
                        bytestring.len()
                    )));
                }
                bytemuck::pod_collect_to_vec::<u8, f32>(&bytestring)
                    .into_iter()
                    .map(|v| v as f64)
                    .collect()
            }
        };
        Ok(values)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};

    fn encode(values: &[f64], zlib: bool) -> Vec<u8> {
        let raw: &[u8] = bytemuck::cast_slice(values);
        let raw = if zlib {
            let mut compressor = ZlibEncoder::new(Vec::new(), Compression::best());
            compressor.write_all(raw).unwrap();
            compressor.finish().unwrap()
        } else {
            raw.to_vec()
        };
        base64_simd::STANDARD.encode_type::<Vec<u8>>(&raw)
    }

    #[test]
    fn test_decode_arrays() {
        let values = vec![100.5, 200.25, 300.125];
        for zlib in [false, true] {
            let array = EncodedArray {
                role: ArrayRole::MZ,
                dtype: ArrayDType::Float64,
                compression: if zlib {
                    ArrayCompression::Zlib
                } else {
                    ArrayCompression::NoCompression
                },
                data: encode(&values, zlib),
            };
            assert_eq!(array.decode().unwrap(), values);
        }

        let array = EncodedArray {
            data: b"not base64!".to_vec(),
            ..Default::default()
        };
        assert!(array.decode().is_err());
    }

    #[test]
    fn test_time_units() {
        let param = CVParam {
            accession: SCAN_START_TIME.into(),
            value: "1.5".into(),
            unit_accession: Some(UNIT_MINUTE.into()),
        };
        assert_eq!(param.as_seconds().unwrap(), 90.0);
        let param = CVParam {
            unit_accession: Some("UO:0000010".into()),
            ..param
        };
        assert_eq!(param.as_seconds().unwrap(), 1.5);
    }
}
