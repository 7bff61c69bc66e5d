//! Read the spectra of [mzML](https://www.psidev.info/mzML) documents. Supports
//! building an offset index and random access when reading from a source that
//! supports [`io::Seek`](std::io::Seek).
//!
//! **Requires the `mzml` feature, enabled by default**
#![cfg(feature = "mzml")]
mod reader;
mod reading_shared;

pub use reader::{is_mzml, MzMLRecordReader};
pub use reading_shared::{MzMLError, MzMLParserState};

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::traits::SpectrumRecordSource;
    use crate::io::RecordError;
    use crate::spectrum::{Charge, SpectrumKind};
    use std::sync::atomic::AtomicBool;
    use std::{fs, io, path};

    const OFFSETS: [u64; 3] = [455, 1953, 4258];

    fn open_small() -> MzMLRecordReader<fs::File> {
        let path = path::Path::new("./test/data/small.mzML");
        let file = fs::File::open(path).expect("Test file doesn't exist");
        MzMLRecordReader::new(file, "small.mzML")
    }

    #[test_log::test]
    fn test_scan_entries() -> Result<(), RecordError> {
        let mut reader = open_small();
        let entries = reader.scan_entries(&AtomicBool::new(false))?.unwrap();
        assert_eq!(entries.len(), 3);
        let offsets: Vec<u64> = entries.iter().map(|e| e.byte_offset).collect();
        assert_eq!(offsets, OFFSETS);

        let ms1 = &entries[0];
        assert_eq!(ms1.title, "controllerType=0 controllerNumber=1 scan=1");
        assert_eq!(ms1.ms_level, 1);
        assert_eq!(ms1.precursor_rt, 60.0);
        assert_eq!(ms1.peak_count, 3);
        assert_eq!(ms1.charge, None);
        assert_eq!(ms1.scan_number.as_deref(), Some("1"));

        let msn = &entries[1];
        assert_eq!(msn.ms_level, 2);
        assert_eq!(msn.precursor_mz, 650.75);
        assert_eq!(msn.precursor_intensity, Some(5000.0));
        assert_eq!(msn.precursor_rt, 75.0);
        assert_eq!(msn.charge, Some(2));

        assert_eq!(entries[2].precursor_rt, 95.0);
        assert_eq!(entries[2].peak_count, 4);
        Ok(())
    }

    #[test_log::test]
    fn test_random_access() -> Result<(), RecordError> {
        let mut reader = open_small();
        let scan = reader.read_spectrum_at(OFFSETS[2])?;
        assert_eq!(scan.title(), "controllerType=0 controllerNumber=1 scan=3");
        assert_eq!(scan.source_file(), "small.mzML");
        assert_eq!(scan.kind(), SpectrumKind::MSn);
        assert_eq!(scan.peaks().len(), 4);
        // 32-bit m/z values with zlib compression
        assert_eq!(scan.mz_array(), &[120.5, 240.25, 360.75, 480.5]);
        assert_eq!(scan.max_intensity(), 35.0);
        let precursor = scan.precursor().unwrap();
        assert_eq!(precursor.mz, 801.4);
        assert_eq!(precursor.charges, vec![Charge::positive(3)]);

        let scan = reader.read_spectrum_at(OFFSETS[0])?;
        assert_eq!(scan.kind(), SpectrumKind::MS1);
        assert!(scan.precursor().is_none());
        assert_eq!(scan.scan_start_time(), 60.0);
        assert_eq!(scan.peaks().get(300.25).unwrap().intensity, 250.0);
        assert_eq!(scan.peaks().get(300.25).unwrap().rt, 60.0);

        let scan = reader.read_spectrum_at(OFFSETS[1])?;
        assert_eq!(scan.peaks().len(), 2);
        assert_eq!(scan.total_intensity(), 120.0);
        Ok(())
    }

    #[test_log::test]
    fn test_precursor_only() -> Result<(), RecordError> {
        let mut reader = open_small();
        let precursor = reader.read_precursor_at(OFFSETS[1])?.unwrap();
        assert_eq!(precursor.mz, 650.75);
        assert_eq!(precursor.intensity, 5000.0);
        assert_eq!(precursor.rt, 75.0);
        assert_eq!(precursor.charges, vec![Charge::positive(2)]);
        assert!(reader.read_precursor_at(OFFSETS[0])?.is_none());
        Ok(())
    }

    #[test]
    fn test_bad_offset() {
        let mut reader = open_small();
        let err = reader.read_spectrum_at(1_000_000).unwrap_err();
        assert!(matches!(err, RecordError::NoRecordAt(1_000_000)));
        // The start of the document is not a spectrum
        let err = reader.read_spectrum_at(0).unwrap_err();
        assert!(matches!(err, RecordError::NoRecordAt(0)));
    }

    #[test]
    fn test_offset_not_at_spectrum() -> Result<(), RecordError> {
        let mut reader = open_small();
        // The closing tag of the first spectrum
        let err = reader.read_spectrum_at(1935).unwrap_err();
        assert!(matches!(err, RecordError::NoRecordAt(1935)));
        // A parameter inside the first spectrum
        let err = reader.read_precursor_at(555).unwrap_err();
        assert!(matches!(err, RecordError::NoRecordAt(555)));
        // Part way through a start tag
        let err = reader.read_spectrum_at(OFFSETS[1] + 4).unwrap_err();
        assert!(matches!(err, RecordError::NoRecordAt(1957)));

        let scan = reader.read_spectrum_at(OFFSETS[1])?;
        assert_eq!(scan.title(), "controllerType=0 controllerNumber=1 scan=2");
        Ok(())
    }

    #[test]
    fn test_missing_id() {
        let text = br#"<mzML><run><spectrumList count="1">
<spectrum index="0" defaultArrayLength="0"></spectrum>
</spectrumList></run></mzML>"#;
        let mut reader = MzMLRecordReader::new(io::Cursor::new(&text[..]), "bad.mzML");
        let err = reader.scan_entries(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, RecordError::MissingTitle(36)));
    }

    #[test]
    fn test_truncated_record() {
        let text = br#"<spectrum index="0" id="scan=1" defaultArrayLength="0"><cvParam accession="MS:1000511" value="1"/>"#;
        let mut reader = MzMLRecordReader::new(io::Cursor::new(&text[..]), "bad.mzML");
        let err = reader.read_spectrum_at(0).unwrap_err();
        assert!(matches!(
            err,
            RecordError::MzML(MzMLError::IncompleteSpectrum(_))
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_cancelled_scan() -> Result<(), RecordError> {
        let mut reader = open_small();
        assert!(reader.scan_entries(&AtomicBool::new(true))?.is_none());
        Ok(())
    }

    #[test]
    fn test_is_mzml() {
        let buf = fs::read("./test/data/small.mzML").unwrap();
        assert!(is_mzml(&buf));
        assert!(!is_mzml(b"BEGIN IONS"));
    }
}
