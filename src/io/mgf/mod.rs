//! Read [MGF](https://www.matrixscience.com/help/data_file_help.html#GEN) files.
//! Supports building an offset index and random access when reading from a
//! source that supports [`io::Seek`](std::io::Seek).
//!
//! **Requires the `mgf` feature, enabled by default**
#![cfg(feature = "mgf")]
mod reader;

pub use reader::{is_mgf, MGFError, MGFParserState, MGFRecordReader};
