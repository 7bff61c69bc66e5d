mod dispatch;
mod inference;

pub use dispatch::{open_record_source, open_record_source_as, BoxedRecordSource};
pub use inference::{infer_from_path, infer_from_stream, MassSpectrometryFormat};
