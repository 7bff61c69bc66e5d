use std::{
    io::{self, prelude::*, BufReader, SeekFrom},
    mem,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{trace, warn};
use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Reader,
};

use crate::io::{
    offset_index::FileIndexEntry,
    traits::{RecordError, SeekRead, SpectrumRecordSource},
    utils::DetailLevel,
};
use crate::peaks::{Peak, PeakMap};
use crate::spectrum::{Charge, Precursor, Spectrum, SpectrumDescription};

use super::reading_shared::{
    attribute_value, xml_error, ArrayRole, CVParam, EncodedArray, MzMLError, MzMLParserState,
    CHARGE_STATE, MS_LEVEL, PEAK_INTENSITY, SCAN_START_TIME, SELECTED_ION_MZ,
};

const POSSIBLE_CHARGE_STATE: &str = "MS:1000633";

type ParserResult = Result<MzMLParserState, MzMLError>;

/// Find the `scan=NNN` token of a native spectrum identifier
fn scan_number_from_id(id: &str) -> Option<String> {
    id.split_ascii_whitespace()
        .find_map(|token| token.strip_prefix("scan="))
        .map(|s| s.to_string())
}

/// Accumulates the parts of one `<spectrum>` element as XML events arrive
#[derive(Debug, Default)]
struct MzMLSpectrumBuilder {
    detail_level: DetailLevel,
    id: Option<String>,
    ms_level: Option<u8>,
    scan_start_time: f64,
    peak_count: u32,
    selected_ion_count: usize,
    precursor_mz: Option<f64>,
    precursor_intensity: Option<f64>,
    charges: Vec<Charge>,
    current_array: EncodedArray,
    arrays: Vec<EncodedArray>,
}

impl MzMLSpectrumBuilder {
    fn new(detail_level: DetailLevel) -> Self {
        Self {
            detail_level,
            ..Default::default()
        }
    }

    fn fill_spectrum(&mut self, param: &CVParam) -> Result<(), MzMLError> {
        match param.accession.as_str() {
            MS_LEVEL => self.ms_level = Some(param.parse()?),
            SCAN_START_TIME => self.scan_start_time = param.as_seconds()?,
            _ => {}
        }
        Ok(())
    }

    fn fill_selected_ion(&mut self, param: &CVParam) -> Result<(), MzMLError> {
        // Only the first selected ion describes the precursor
        if self.selected_ion_count > 1 {
            return Ok(());
        }
        match param.accession.as_str() {
            SELECTED_ION_MZ => self.precursor_mz = Some(param.parse()?),
            PEAK_INTENSITY => self.precursor_intensity = Some(param.parse()?),
            CHARGE_STATE | POSSIBLE_CHARGE_STATE => {
                let z: i32 = param.parse()?;
                let charge = Charge::from(z);
                if !self.charges.contains(&charge) {
                    self.charges.push(charge);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn fill_param(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        let param = CVParam::from_element(event);
        match state {
            MzMLParserState::SelectedIon => self.fill_selected_ion(&param)?,
            MzMLParserState::BinaryDataArray => self.current_array.fill_param(&param),
            MzMLParserState::Spectrum => self.fill_spectrum(&param)?,
            _ => {}
        }
        Ok(state)
    }

    fn start_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        match event.local_name().as_ref() {
            b"spectrum" => {
                self.id = Some(attribute_value(event, b"id").ok_or(MzMLError::MissingId)?);
                if let Some(count) = attribute_value(event, b"defaultArrayLength") {
                    self.peak_count = count.trim().parse().map_err(|_| {
                        MzMLError::MalformedParam {
                            accession: "defaultArrayLength".into(),
                            value: count.clone(),
                        }
                    })?;
                }
                Ok(MzMLParserState::Spectrum)
            }
            b"cvParam" => self.fill_param(event, state),
            b"precursorList" => Ok(MzMLParserState::PrecursorList),
            b"selectedIon" => {
                self.selected_ion_count += 1;
                Ok(MzMLParserState::SelectedIon)
            }
            b"binaryDataArrayList" => {
                if matches!(self.detail_level, DetailLevel::MetadataOnly) {
                    // The peak data is all that remains
                    Ok(MzMLParserState::SpectrumDone)
                } else {
                    Ok(MzMLParserState::BinaryDataArrayList)
                }
            }
            b"binaryDataArray" => {
                self.current_array = EncodedArray::default();
                Ok(MzMLParserState::BinaryDataArray)
            }
            b"binary" => Ok(MzMLParserState::Binary),
            _ => Ok(state),
        }
    }

    fn empty_element(&mut self, event: &BytesStart, state: MzMLParserState) -> ParserResult {
        match event.local_name().as_ref() {
            b"cvParam" => self.fill_param(event, state),
            _ => Ok(state),
        }
    }

    fn end_element(&mut self, event: &BytesEnd, state: MzMLParserState) -> ParserResult {
        let next = match event.local_name().as_ref() {
            b"spectrum" => MzMLParserState::SpectrumDone,
            b"selectedIon" => MzMLParserState::PrecursorList,
            b"precursorList" => MzMLParserState::Spectrum,
            b"binary" => MzMLParserState::BinaryDataArray,
            b"binaryDataArray" => {
                self.arrays.push(mem::take(&mut self.current_array));
                MzMLParserState::BinaryDataArrayList
            }
            b"binaryDataArrayList" => MzMLParserState::Spectrum,
            _ => state,
        };
        Ok(next)
    }

    fn text(&mut self, event: &BytesText, state: MzMLParserState) -> ParserResult {
        if state == MzMLParserState::Binary && self.detail_level != DetailLevel::MetadataOnly {
            let bin = event
                .unescape()
                .map_err(|e| MzMLError::XMLError(state, e))?;
            self.current_array.data = bin.as_bytes().to_vec();
        }
        Ok(state)
    }

    fn ms_level(&self) -> u8 {
        self.ms_level
            .unwrap_or(if self.precursor_mz.is_some() { 2 } else { 1 })
    }

    fn precursor(&self) -> Option<Precursor> {
        if self.ms_level() < 2 {
            return None;
        }
        let mz = self.precursor_mz?;
        Some(Precursor::new(
            mz,
            self.scan_start_time,
            self.precursor_intensity.unwrap_or_default(),
            self.charges.clone(),
        ))
    }

    fn into_entry(self, offset: u64) -> FileIndexEntry {
        let ms_level = self.ms_level();
        let scan_number = self.id.as_deref().and_then(scan_number_from_id);
        FileIndexEntry {
            title: self.id.unwrap_or_default(),
            byte_offset: offset,
            precursor_mz: self.precursor_mz.unwrap_or_default(),
            precursor_intensity: self.precursor_intensity,
            precursor_rt: self.scan_start_time,
            charge: self.charges.first().map(|z| z.value()),
            peak_count: self.peak_count,
            ms_level,
            scan_number,
        }
    }

    fn into_spectrum(self, source_file: &str) -> Result<Spectrum, MzMLError> {
        let precursor = self.precursor();
        let ms_level = self.ms_level();
        let rt = self.scan_start_time;

        let mut mz_array = Vec::new();
        let mut intensity_array = Vec::new();
        for array in self.arrays.iter() {
            match array.role {
                ArrayRole::MZ => mz_array = array.decode()?,
                ArrayRole::Intensity => intensity_array = array.decode()?,
                ArrayRole::Unknown => {
                    trace!("Skipping unrecognized binary data array");
                }
            }
        }
        if mz_array.len() != intensity_array.len() {
            return Err(MzMLError::ArrayLengthMismatch(
                mz_array.len(),
                intensity_array.len(),
            ));
        }
        let peaks: PeakMap = mz_array
            .into_iter()
            .zip(intensity_array)
            .map(|(mz, intensity)| Peak::new(mz, intensity, rt))
            .collect();

        let title = self.id.unwrap_or_default();
        let description = SpectrumDescription {
            scan_number: scan_number_from_id(&title),
            title,
            source_file: source_file.to_string(),
            ms_level,
            scan_start_time: rt,
        };
        Ok(Spectrum::new(description, precursor, peaks))
    }
}

/**
An mzML record reader supporting indexing and random access by byte offset.

Records are the `<spectrum>` elements of the document and their titles are the
elements' `id` attributes. Only the parts of the document needed for the
spectrum model are read: MS level, scan start time, the first selected ion of
the precursor list and the m/z and intensity arrays.
*/
pub struct MzMLRecordReader<R: io::Read> {
    pub handle: BufReader<R>,
    pub state: MzMLParserState,
    pub detail_level: DetailLevel,
    source_file: String,
    buffer: Vec<u8>,
}

impl<R: io::Read> MzMLRecordReader<R> {
    pub fn new(file: R, source_file: impl Into<String>) -> MzMLRecordReader<R> {
        MzMLRecordReader {
            handle: BufReader::with_capacity(8192, file),
            state: MzMLParserState::Start,
            detail_level: DetailLevel::Full,
            source_file: source_file.into(),
            buffer: Vec::new(),
        }
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Parse the `<spectrum>` element which begins at the current position of
    /// the stream. Returns `Ok(false)` if the first event is not its start tag.
    fn parse_into(&mut self, builder: &mut MzMLSpectrumBuilder) -> Result<bool, RecordError> {
        self.buffer.clear();
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);
        self.state = MzMLParserState::Start;

        loop {
            let state = self.state;
            let next = match reader.read_event_into(&mut self.buffer) {
                Ok(Event::Start(ref e)) => {
                    if state == MzMLParserState::Start && e.local_name().as_ref() != b"spectrum" {
                        return Ok(false);
                    }
                    builder.start_element(e, state)
                }
                Ok(Event::Eof) => {
                    if state == MzMLParserState::Start {
                        return Ok(false);
                    }
                    return Err(MzMLError::IncompleteSpectrum(state).into());
                }
                // Anything before the spectrum start tag means the position is not a record start
                Ok(_) if state == MzMLParserState::Start => return Ok(false),
                Ok(Event::Empty(ref e)) => builder.empty_element(e, state),
                Ok(Event::End(ref e)) => builder.end_element(e, state),
                Ok(Event::Text(ref e)) => builder.text(e, state),
                Ok(_) => Ok(state),
                Err(e) => return Err(xml_error(state, e)),
            };
            self.buffer.clear();
            self.state = next?;
            if self.state == MzMLParserState::SpectrumDone {
                break;
            }
        }
        Ok(true)
    }
}

impl<R: SeekRead> MzMLRecordReader<R> {
    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.handle.seek(pos)
    }

    fn read_record_at(
        &mut self,
        offset: u64,
        detail_level: DetailLevel,
    ) -> Result<MzMLSpectrumBuilder, RecordError> {
        self.seek(SeekFrom::Start(offset))?;
        let mut builder = MzMLSpectrumBuilder::new(detail_level);
        match self.parse_into(&mut builder) {
            Ok(true) => Ok(builder),
            Ok(false) => Err(RecordError::NoRecordAt(offset)),
            // Landing inside another element is reported as a missing record
            Err(RecordError::MzML(MzMLError::XMLError(MzMLParserState::Start, _))) => {
                Err(RecordError::NoRecordAt(offset))
            }
            Err(e) => Err(e),
        }
    }
}

impl<R: SeekRead> SpectrumRecordSource for MzMLRecordReader<R> {
    /// Traverse the document once, recording the offset of each `<spectrum>`
    /// start tag along with the metadata of the record.
    fn scan_entries(
        &mut self,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<FileIndexEntry>>, RecordError> {
        self.seek(SeekFrom::Start(0))?;
        self.buffer.clear();
        let mut reader = Reader::from_reader(&mut self.handle);
        reader.trim_text(true);

        let mut entries = Vec::new();
        let mut pending: Option<(u64, MzMLSpectrumBuilder)> = None;
        let mut state = MzMLParserState::Start;

        loop {
            let event = reader.read_event_into(&mut self.buffer);
            let result = match event {
                Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"spectrum" {
                        // The position is just past the start tag's closing `>`
                        let offset = (reader.buffer_position() - e.len() - 2) as u64;
                        if cancel.load(Ordering::Relaxed) {
                            trace!(
                                "Index scan of {} cancelled at byte {offset}",
                                self.source_file
                            );
                            return Ok(None);
                        }
                        let mut builder = MzMLSpectrumBuilder::new(DetailLevel::MetadataOnly);
                        let result = builder.start_element(e, state);
                        if let Err(MzMLError::MissingId) = result {
                            return Err(RecordError::MissingTitle(offset));
                        }
                        pending = Some((offset, builder));
                        result
                    } else if let Some((_, builder)) = pending.as_mut() {
                        builder.start_element(e, state)
                    } else {
                        Ok(state)
                    }
                }
                Ok(Event::Empty(ref e)) => match pending.as_mut() {
                    Some((_, builder)) => builder.empty_element(e, state),
                    None => Ok(state),
                },
                Ok(Event::End(ref e)) => {
                    let name = e.local_name();
                    if name.as_ref() == b"spectrum" {
                        if let Some((offset, builder)) = pending.take() {
                            entries.push(builder.into_entry(offset));
                        }
                        Ok(MzMLParserState::Start)
                    } else if name.as_ref() == b"spectrumList" {
                        break;
                    } else if let Some((_, builder)) = pending.as_mut() {
                        builder.end_element(e, state)
                    } else {
                        Ok(state)
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => Ok(state),
                Err(e) => return Err(xml_error(state, e)),
            };
            self.buffer.clear();
            state = match result {
                // Peak arrays are not needed for the index, resume at the next
                // element the builder cares about
                Ok(MzMLParserState::SpectrumDone) => MzMLParserState::BinaryDataArrayList,
                Ok(state) => state,
                Err(e) => return Err(e.into()),
            };
        }

        if let Some((offset, _)) = pending {
            warn!(
                "The spectrum at byte {offset} in {} was never closed",
                self.source_file
            );
        }
        self.state = MzMLParserState::Start;
        if entries.is_empty() {
            warn!("An index was built but no entries were found")
        }
        Ok(Some(entries))
    }

    fn read_spectrum_at(&mut self, offset: u64) -> Result<Spectrum, RecordError> {
        let builder = self.read_record_at(offset, self.detail_level)?;
        Ok(builder.into_spectrum(&self.source_file)?)
    }

    fn read_precursor_at(&mut self, offset: u64) -> Result<Option<Precursor>, RecordError> {
        let builder = self.read_record_at(offset, DetailLevel::MetadataOnly)?;
        Ok(builder.precursor())
    }
}

/// Check whether the buffer looks like the beginning of an mzML document
pub fn is_mzml(buf: &[u8]) -> bool {
    let needle = b"<mzML";
    buf.windows(needle.len()).any(|window| window == needle)
}
