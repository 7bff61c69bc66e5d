use std::{
    io::{self, prelude::*, SeekFrom},
    str,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{trace, warn};
use thiserror::Error;

use crate::io::{
    offset_index::FileIndexEntry,
    traits::{RecordError, SeekRead, SpectrumRecordSource},
    utils::DetailLevel,
};
use crate::peaks::{Peak, PeakMap};
use crate::spectrum::{parse_charge_list, Charge, Precursor, Spectrum, SpectrumDescription};

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum MGFParserState {
    Start,
    FileHeader,
    ScanHeaders,
    Peaks,
    Between,
    /// Positioned at a byte offset where a record must begin
    RecordStart,
    Done,
    Error,
}

#[derive(Debug, Error)]
pub enum MGFError {
    #[error("Encountered a malformed peak line: {0:?}")]
    MalformedPeakLine(String),
    #[error("Encountered a malformed header line: {0}")]
    MalformedHeaderLine(String),
    #[error("Not enough columns for peak line: {0:?}")]
    NotEnoughColumnsForPeakLine(String),
    #[error("The record ended before END IONS")]
    UnterminatedRecord,
}

#[derive(Debug, Default)]
struct SpectrumBuilder {
    title: Option<String>,
    scan_number: Option<String>,
    ms_level: Option<u8>,
    rt: f64,
    precursor_mz: Option<f64>,
    precursor_intensity: f64,
    pepmass_charges: Vec<Charge>,
    charges: Vec<Charge>,
    mz_array: Vec<f64>,
    intensity_array: Vec<f64>,
    detail_level: DetailLevel,
}

impl SpectrumBuilder {
    fn new(detail_level: DetailLevel) -> Self {
        Self {
            detail_level,
            ..Default::default()
        }
    }

    fn precursor(&self) -> Option<Precursor> {
        let mz = self.precursor_mz?;
        let charges = if self.charges.is_empty() {
            self.pepmass_charges.clone()
        } else {
            self.charges.clone()
        };
        Some(Precursor::new(mz, self.rt, self.precursor_intensity, charges))
    }

    fn into_spectrum(self, source_file: &str) -> Spectrum {
        let precursor = self.precursor();
        let ms_level = self
            .ms_level
            .unwrap_or(if precursor.is_some() { 2 } else { 1 });
        let rt = self.rt;
        let peaks: PeakMap = self
            .mz_array
            .into_iter()
            .zip(self.intensity_array)
            .map(|(mz, intensity)| Peak::new(mz, intensity, rt))
            .collect();
        let description = SpectrumDescription {
            title: self.title.unwrap_or_default(),
            source_file: source_file.to_string(),
            ms_level,
            scan_number: self.scan_number,
            scan_start_time: rt,
        };
        Spectrum::new(description, precursor, peaks)
    }
}

/// Parse the value of an `RTINSECONDS` header. Some writers report a range
/// (`"12.5-14.2"`), in which case the start of the range is used.
fn parse_rt(value: &str) -> Result<f64, MGFError> {
    let head = match value.find(|c: char| c == '-' || c == ',') {
        Some(i) if i > 0 => &value[..i],
        _ => value,
    };
    head.trim().parse::<f64>().map_err(|e| {
        MGFError::MalformedHeaderLine(format!("Malformed RTINSECONDS value {value}: {e}"))
    })
}

/// Split a `PEPMASS` header value into m/z, optional intensity and optional charge
fn parse_pepmass(value: &str) -> Result<(f64, Option<f64>, Option<Charge>), MGFError> {
    let mut parts = value.split_ascii_whitespace();
    let mz = match parts.next() {
        Some(s) => s,
        None => {
            return Err(MGFError::MalformedHeaderLine(
                "No m/z value in PEPMASS header".into(),
            ))
        }
    };
    let mz: f64 = mz.parse().map_err(|e| {
        MGFError::MalformedHeaderLine(format!("Malformed m/z value in PEPMASS header {value}: {e}"))
    })?;
    let intensity = parts.next().and_then(|v| {
        v.parse::<f64>()
            .map_err(|e| warn!("Failed to parse PEPMASS intensity {value}: {e}"))
            .ok()
    });
    let charge = parts.next().and_then(|v| {
        v.parse::<Charge>()
            .map_err(|e| warn!("Failed to parse PEPMASS charge {value}: {e}"))
            .ok()
    });
    Ok((mz, intensity, charge))
}

fn is_peak_line(line: &str) -> bool {
    line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// An MGF (Mascot Generic Format) record reader supporting indexing and random
/// access by byte offset.
///
/// Each record starts at a `BEGIN IONS` line and runs to the next `END IONS`
/// line. The reader produces [`Spectrum`] values whose `source_file` is the
/// name given at construction.
pub struct MGFRecordReader<R: io::Read> {
    pub handle: io::BufReader<R>,
    pub state: MGFParserState,
    pub detail_level: DetailLevel,
    source_file: String,
    error: Option<MGFError>,
}

impl<R: io::Read> MGFRecordReader<R> {
    /// Create a new reader over `file`, labelling its spectra with `source_file`
    pub fn new(file: R, source_file: impl Into<String>) -> MGFRecordReader<R> {
        MGFRecordReader {
            handle: io::BufReader::with_capacity(8192, file),
            state: MGFParserState::Start,
            detail_level: DetailLevel::Full,
            source_file: source_file.into(),
            error: None,
        }
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    fn fail(&mut self, error: MGFError) -> bool {
        self.state = MGFParserState::Error;
        self.error = Some(error);
        false
    }

    fn parse_peak_from_line(&mut self, line: &str, builder: &mut SpectrumBuilder) -> bool {
        let mut it = line.split_ascii_whitespace();
        let (mz_token, intensity_token) = match (it.next(), it.next()) {
            (Some(mz), Some(intensity)) => (mz, intensity),
            _ => return self.fail(MGFError::NotEnoughColumnsForPeakLine(line.to_string())),
        };
        if matches!(builder.detail_level, DetailLevel::MetadataOnly) {
            return true;
        }
        match (mz_token.parse::<f64>(), intensity_token.parse::<f64>()) {
            (Ok(mz), Ok(intensity)) => {
                builder.mz_array.push(mz);
                builder.intensity_array.push(intensity);
                true
            }
            _ => self.fail(MGFError::MalformedPeakLine(line.to_string())),
        }
    }

    fn handle_scan_header(&mut self, line: &str, builder: &mut SpectrumBuilder) -> bool {
        if is_peak_line(line) {
            if matches!(builder.detail_level, DetailLevel::MetadataOnly) {
                // Every header precedes the peak list, so stop here. The remaining
                // peak lines are skipped by the `Between` state on the next read.
                self.state = MGFParserState::Between;
                return false;
            }
            self.state = MGFParserState::Peaks;
            self.parse_peak_from_line(line, builder)
        } else if line == "END IONS" {
            self.state = MGFParserState::Between;
            false
        } else if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            match key.trim() {
                "TITLE" => builder.title = Some(value.to_string()),
                "RTINSECONDS" => match parse_rt(value) {
                    Ok(rt) => builder.rt = rt,
                    Err(e) => return self.fail(e),
                },
                "SCANS" => builder.scan_number = Some(value.to_string()),
                "MSLEVEL" => match value.parse::<u8>() {
                    Ok(level) => builder.ms_level = Some(level),
                    Err(e) => {
                        return self.fail(MGFError::MalformedHeaderLine(format!(
                            "Malformed MSLEVEL value {value}: {e}"
                        )))
                    }
                },
                "PEPMASS" => match parse_pepmass(value) {
                    Ok((mz, intensity, charge)) => {
                        builder.precursor_mz = Some(mz);
                        builder.precursor_intensity = intensity.unwrap_or_default();
                        builder.pepmass_charges = charge.into_iter().collect();
                    }
                    Err(e) => return self.fail(e),
                },
                "CHARGE" => match parse_charge_list(value) {
                    Ok(charges) => builder.charges = charges,
                    Err(e) => {
                        return self.fail(MGFError::MalformedHeaderLine(format!(
                            "Could not parse charge value {value}: {e}"
                        )))
                    }
                },
                _ => {
                    trace!("Skipping MGF header {key}");
                }
            };
            true
        } else {
            self.fail(MGFError::MalformedHeaderLine(format!(
                "No '=' in header line {line:?}"
            )))
        }
    }

    fn handle_peak(&mut self, line: &str, builder: &mut SpectrumBuilder) -> bool {
        if is_peak_line(line) {
            self.parse_peak_from_line(line, builder)
        } else if line == "END IONS" {
            self.state = MGFParserState::Between;
            false
        } else {
            self.fail(MGFError::MalformedPeakLine(line.to_string()))
        }
    }

    fn handle_start(&mut self, line: &str) -> bool {
        if line == "BEGIN IONS" {
            self.state = MGFParserState::ScanHeaders;
        } else if line.contains('=') {
            self.state = MGFParserState::FileHeader;
        }
        true
    }

    fn handle_between(&mut self, line: &str) -> bool {
        if line == "BEGIN IONS" {
            self.state = MGFParserState::ScanHeaders;
        }
        true
    }

    fn handle_record_start(&mut self, line: &str) -> bool {
        if line == "BEGIN IONS" {
            self.state = MGFParserState::ScanHeaders;
            true
        } else {
            trace!("Expected BEGIN IONS, found {line:?}");
            self.state = MGFParserState::Between;
            false
        }
    }

    /// Read the next record from the current position into `builder`. Returns
    /// whether a `BEGIN IONS` line was seen.
    fn parse_into(&mut self, builder: &mut SpectrumBuilder) -> Result<bool, RecordError> {
        let mut buffer = String::new();
        let mut work = true;
        let mut had_begin_ions = false;

        while work {
            buffer.clear();
            let b = match self.handle.read_line(&mut buffer) {
                Ok(b) => b,
                Err(err) => {
                    self.state = MGFParserState::Error;
                    return Err(RecordError::IOError(err));
                }
            };
            if b == 0 {
                if had_begin_ions && self.state != MGFParserState::Done {
                    self.state = MGFParserState::Error;
                    return Err(MGFError::UnterminatedRecord.into());
                }
                self.state = MGFParserState::Done;
                break;
            }

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            work = match self.state {
                MGFParserState::Start | MGFParserState::FileHeader => self.handle_start(line),
                MGFParserState::ScanHeaders => {
                    had_begin_ions = true;
                    self.handle_scan_header(line, builder)
                }
                MGFParserState::Peaks => self.handle_peak(line, builder),
                MGFParserState::Between => self.handle_between(line),
                MGFParserState::RecordStart => self.handle_record_start(line),
                MGFParserState::Done | MGFParserState::Error => false,
            };
            if self.state == MGFParserState::ScanHeaders {
                had_begin_ions = true;
            }

            if self.state == MGFParserState::Error {
                let err = self
                    .error
                    .take()
                    .unwrap_or(MGFError::MalformedHeaderLine(line.to_string()));
                return Err(err.into());
            }
        }
        Ok(had_begin_ions)
    }

    /// Read the next spectrum from the stream, if there is one
    pub fn read_next(&mut self) -> Result<Option<Spectrum>, RecordError> {
        let mut builder = SpectrumBuilder::new(self.detail_level);
        if self.parse_into(&mut builder)? {
            Ok(Some(builder.into_spectrum(&self.source_file)))
        } else {
            Ok(None)
        }
    }
}

impl<R: io::Read> Iterator for MGFRecordReader<R> {
    type Item = Spectrum;

    /// Read the next spectrum from the file. Errors end iteration.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(spec) => spec,
            Err(e) => {
                warn!("Stopping MGF iteration in {}: {e}", self.source_file);
                None
            }
        }
    }
}

impl<R: SeekRead> MGFRecordReader<R> {
    pub fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.handle.seek(pos)
    }

    fn read_record_at(
        &mut self,
        offset: u64,
        detail_level: DetailLevel,
    ) -> Result<SpectrumBuilder, RecordError> {
        self.seek(SeekFrom::Start(offset))?;
        self.state = MGFParserState::RecordStart;
        self.error = None;
        let mut builder = SpectrumBuilder::new(detail_level);
        if self.parse_into(&mut builder)? {
            Ok(builder)
        } else {
            Err(RecordError::NoRecordAt(offset))
        }
    }
}

#[derive(Debug, Default)]
struct PendingEntry {
    offset: u64,
    title: Option<String>,
    precursor_mz: Option<f64>,
    precursor_intensity: Option<f64>,
    rt: f64,
    charge: Option<i32>,
    peak_count: u32,
    ms_level: Option<u8>,
    scan_number: Option<String>,
}

impl PendingEntry {
    fn new(offset: u64) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    fn header(&mut self, key: &str, value: &str) {
        match key {
            "TITLE" => self.title = Some(value.to_string()),
            "RTINSECONDS" => match parse_rt(value) {
                Ok(rt) => self.rt = rt,
                Err(e) => warn!("{e}"),
            },
            "SCANS" => self.scan_number = Some(value.to_string()),
            "MSLEVEL" => self.ms_level = value.parse().ok(),
            "PEPMASS" => match parse_pepmass(value) {
                Ok((mz, intensity, charge)) => {
                    self.precursor_mz = Some(mz);
                    self.precursor_intensity = intensity;
                    if self.charge.is_none() {
                        self.charge = charge.map(|z| z.value());
                    }
                }
                Err(e) => warn!("{e}"),
            },
            "CHARGE" => match parse_charge_list(value) {
                Ok(charges) => {
                    if let Some(z) = charges.first() {
                        self.charge = Some(z.value())
                    }
                }
                Err(e) => warn!("Could not parse charge value {value}: {e}"),
            },
            _ => {}
        }
    }

    fn finish(self) -> Result<FileIndexEntry, RecordError> {
        let title = self.title.ok_or(RecordError::MissingTitle(self.offset))?;
        let ms_level = self
            .ms_level
            .unwrap_or(if self.precursor_mz.is_some() { 2 } else { 1 });
        Ok(FileIndexEntry {
            title,
            byte_offset: self.offset,
            precursor_mz: self.precursor_mz.unwrap_or_default(),
            precursor_intensity: self.precursor_intensity,
            precursor_rt: self.rt,
            charge: self.charge,
            peak_count: self.peak_count,
            ms_level,
            scan_number: self.scan_number,
        })
    }
}

impl<R: SeekRead> SpectrumRecordSource for MGFRecordReader<R> {
    /// Builds the entries by a fast pre-scan of the text, storing the offset of
    /// each `BEGIN IONS` line along with the record's precursor summary.
    fn scan_entries(
        &mut self,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<FileIndexEntry>>, RecordError> {
        let mut offset: u64 = 0;
        let mut entries = Vec::new();
        let mut pending: Option<PendingEntry> = None;

        self.seek(SeekFrom::Start(0))?;
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            buffer.clear();
            let b = self.handle.read_until(b'\n', &mut buffer)?;
            if b == 0 {
                break;
            }
            let line = match str::from_utf8(&buffer) {
                Ok(line) => line.trim(),
                Err(_) => {
                    offset += b as u64;
                    continue;
                }
            };
            if line == "BEGIN IONS" {
                if cancel.load(Ordering::Relaxed) {
                    trace!("Index scan of {} cancelled at byte {offset}", self.source_file);
                    return Ok(None);
                }
                if let Some(unterminated) = pending.take() {
                    warn!(
                        "Record at byte {} in {} has no END IONS",
                        unterminated.offset, self.source_file
                    );
                }
                pending = Some(PendingEntry::new(offset));
            } else if line == "END IONS" {
                if let Some(entry) = pending.take() {
                    entries.push(entry.finish()?);
                }
            } else if let Some(entry) = pending.as_mut() {
                if is_peak_line(line) {
                    entry.peak_count += 1;
                } else if let Some((key, value)) = line.split_once('=') {
                    entry.header(key.trim(), value.trim());
                }
            }
            offset += b as u64;
        }
        self.state = MGFParserState::Start;
        if entries.is_empty() {
            warn!("An index was built but no entries were found")
        }
        Ok(Some(entries))
    }

    fn read_spectrum_at(&mut self, offset: u64) -> Result<Spectrum, RecordError> {
        let builder = self.read_record_at(offset, self.detail_level)?;
        Ok(builder.into_spectrum(&self.source_file))
    }

    fn read_precursor_at(&mut self, offset: u64) -> Result<Option<Precursor>, RecordError> {
        let builder = self.read_record_at(offset, DetailLevel::MetadataOnly)?;
        Ok(builder.precursor())
    }
}

pub fn is_mgf(buf: &[u8]) -> bool {
    let needle = b"BEGIN IONS";
    buf.windows(needle.len()).any(|window| window == needle)
}
