use std::fs;
use std::io::{self, prelude::*, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumCacheError};
use crate::io::infer_format::{infer_from_path, open_record_source_as, MassSpectrometryFormat};
use crate::io::traits::{RecordError, SpectrumRecordSource};
use crate::io::utils::{file_name_of, index_file_name, last_modified_millis};

/// The layout version of the sidecar index. Sidecars written with another
/// version are rebuilt.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// The location and precursor summary of one record in a source file
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub title: String,
    /// The byte offset of the start of the record
    pub byte_offset: u64,
    /// The precursor m/z, `0.0` for records without one
    pub precursor_mz: f64,
    pub precursor_intensity: Option<f64>,
    /// Retention time in seconds
    pub precursor_rt: f64,
    pub charge: Option<i32>,
    pub peak_count: u32,
    pub ms_level: u8,
    pub scan_number: Option<String>,
}

/// Summary statistics over every entry of a [`FileIndex`]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct IndexStatistics {
    pub min_rt: f64,
    pub max_rt: f64,
    pub max_mz: f64,
    pub max_charge: i32,
    pub max_peak_count: u32,
    pub max_intensity: f64,
}

impl IndexStatistics {
    fn from_entries(entries: &[FileIndexEntry]) -> Self {
        if entries.is_empty() {
            return Self::default();
        }
        let mut stats = Self {
            min_rt: f64::INFINITY,
            max_rt: f64::NEG_INFINITY,
            ..Default::default()
        };
        for entry in entries {
            stats.min_rt = stats.min_rt.min(entry.precursor_rt);
            stats.max_rt = stats.max_rt.max(entry.precursor_rt);
            stats.max_mz = stats.max_mz.max(entry.precursor_mz);
            stats.max_charge = stats.max_charge.max(entry.charge.unwrap_or_default());
            stats.max_peak_count = stats.max_peak_count.max(entry.peak_count);
            stats.max_intensity = stats
                .max_intensity
                .max(entry.precursor_intensity.unwrap_or_default());
        }
        stats
    }
}

/**
An ordered table of the records of one source file, mapping each title to the
byte offset of its record along with a precursor summary.

Entries are kept in the order they occur in the file. When a title occurs more
than once, [`FileIndex::get`] resolves it to the last occurrence while every
occurrence stays reachable by ordinal.

The index is persisted as JSON next to its source file and is reused for as long
as the source's modification time is unchanged.
*/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndex {
    format_version: u32,
    file_name: String,
    /// The source file's modification time in milliseconds since the Unix epoch
    last_modified: i64,
    format: MassSpectrometryFormat,
    entries: Vec<FileIndexEntry>,
    #[serde(skip)]
    titles: IndexMap<Box<str>, usize>,
    #[serde(skip)]
    statistics: IndexStatistics,
}

impl PartialEq for FileIndex {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name
            && self.last_modified == other.last_modified
            && self.format == other.format
            && self.entries == other.entries
    }
}

fn scan_error(file_name: &str, err: RecordError) -> SpectrumCacheError {
    match err {
        RecordError::IOError(e) => SpectrumCacheError::Io(e),
        RecordError::MissingTitle(offset) => SpectrumCacheError::MissingTitle {
            file: file_name.to_string(),
            offset,
        },
        e => SpectrumCacheError::Malformed {
            file: file_name.to_string(),
            title: String::new(),
            source: e,
        },
    }
}

impl FileIndex {
    pub fn new(
        file_name: impl Into<String>,
        format: MassSpectrometryFormat,
        last_modified: i64,
        entries: Vec<FileIndexEntry>,
    ) -> Self {
        let mut index = Self {
            format_version: INDEX_FORMAT_VERSION,
            file_name: file_name.into(),
            last_modified,
            format,
            entries,
            titles: IndexMap::new(),
            statistics: IndexStatistics::default(),
        };
        index.reindex();
        index
    }

    /// Rebuild the title lookup and statistics from the entry list
    fn reindex(&mut self) {
        self.titles.clear();
        self.titles.reserve(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            self.titles.insert(entry.title.as_str().into(), i);
        }
        self.statistics = IndexStatistics::from_entries(&self.entries);
    }

    /// Build the index of `path` with one sequential scan of the file
    pub fn build<P: AsRef<Path>>(path: P) -> Result<Self> {
        let never = AtomicBool::new(false);
        match Self::build_cancellable(path, &never)? {
            Some(index) => Ok(index),
            None => unreachable!("An uncancellable index build was cancelled"),
        }
    }

    /// Build the index of `path`, checking `cancel` between records. A cancelled
    /// build gives `Ok(None)` and leaves nothing behind.
    pub fn build_cancellable<P: AsRef<Path>>(path: P, cancel: &AtomicBool) -> Result<Option<Self>> {
        let path = path.as_ref();
        let format = infer_from_path(path);
        if !format.is_supported() {
            return Err(SpectrumCacheError::UnsupportedFormat(
                path.display().to_string(),
            ));
        }
        let file_name = file_name_of(path).unwrap_or_default();
        let last_modified =
            last_modified_millis(path).map_err(|source| SpectrumCacheError::FileNotFound {
                path: path.to_path_buf(),
                source,
            })?;
        let mut reader = open_record_source_as(path, format)?;
        debug!("Building index of {}", path.display());
        let entries = match reader.scan_entries(cancel) {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("Index build of {} was cancelled", path.display());
                return Ok(None);
            }
            Err(e) => return Err(scan_error(&file_name, e)),
        };
        Ok(Some(Self::new(file_name, format, last_modified, entries)))
    }

    /// Read the sidecar index of `path` if it is still current, otherwise build the
    /// index and write a new sidecar
    pub fn load_or_build<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_or_build_with(path, true)
    }

    /// As [`FileIndex::load_or_build`], but with `persist` false the sidecar is
    /// neither read nor written
    pub fn load_or_build_with<P: AsRef<Path>>(path: P, persist: bool) -> Result<Self> {
        let path = path.as_ref();
        if !persist {
            return Self::build(path);
        }
        if !infer_from_path(path).is_supported() {
            return Err(SpectrumCacheError::UnsupportedFormat(
                path.display().to_string(),
            ));
        }
        let last_modified =
            last_modified_millis(path).map_err(|source| SpectrumCacheError::FileNotFound {
                path: path.to_path_buf(),
                source,
            })?;
        let index_path = index_file_name(path);
        if let Some(index_path) = index_path.as_deref() {
            if let Some(index) = Self::read_current(index_path, last_modified) {
                trace!("Reusing index {}", index_path.display());
                return Ok(index);
            }
        }
        Self::rebuild_with(path, true)
    }

    /// Build the index of `path` without consulting any sidecar. With `persist`
    /// the result replaces the sidecar.
    pub fn rebuild_with<P: AsRef<Path>>(path: P, persist: bool) -> Result<Self> {
        let path = path.as_ref();
        let index = Self::build(path)?;
        if !persist {
            return Ok(index);
        }
        if let Some(index_path) = index_file_name(path) {
            if let Err(e) = index.write_sidecar(&index_path) {
                warn!(
                    "Failed to write index to {} because {e}",
                    index_path.display()
                );
            }
        }
        Ok(index)
    }

    /// Read the sidecar at `index_path`, returning it only if it is intact and
    /// matches `last_modified`
    fn read_current(index_path: &Path, last_modified: i64) -> Option<Self> {
        let handle = match fs::File::open(index_path) {
            Ok(handle) => handle,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to open index {}: {e}", index_path.display());
                return None;
            }
        };
        let index = match Self::from_reader(BufReader::new(handle)) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    "The index {} is corrupt and will be rebuilt: {e}",
                    index_path.display()
                );
                return None;
            }
        };
        if index.format_version != INDEX_FORMAT_VERSION {
            debug!(
                "The index {} has layout version {}, rebuilding",
                index_path.display(),
                index.format_version
            );
            None
        } else if index.last_modified != last_modified {
            debug!(
                "The index {} is stale ({} != {last_modified}), rebuilding",
                index_path.display(),
                index.last_modified
            );
            None
        } else {
            Some(index)
        }
    }

    /// Write the index to `index_path` through a temporary file that is renamed
    /// into place once complete
    pub fn write_sidecar(&self, index_path: &Path) -> io::Result<()> {
        let mut tmp_name = index_path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        let result = fs::File::create(&tmp_path).and_then(|handle| {
            let mut writer = BufWriter::new(handle);
            self.to_writer(&mut writer)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp_path, index_path)
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    /// Write the index out in JSON format to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> io::Result<()> {
        serde_json::to_writer(writer, self).map_err(io::Error::from)
    }

    /// Read an index in JSON format from `reader`
    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        let mut index: Self = serde_json::from_reader(reader)?;
        index.reindex();
        Ok(index)
    }

    /// Get the entry for `title`, the last one if the title occurs more than once
    #[inline]
    pub fn get(&self, title: &str) -> Option<&FileIndexEntry> {
        self.titles.get(title).map(|i| &self.entries[*i])
    }

    /// Get the entry at ordinal position `index` in file order
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&FileIndexEntry> {
        self.entries.get(index)
    }

    #[inline]
    pub fn contains_key(&self, title: &str) -> bool {
        self.titles.contains_key(title)
    }

    /// The ordinal positions of every entry with `title`
    pub fn ordinals_of(&self, title: &str) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.title == title)
            .map(|(i, _)| i)
            .collect()
    }

    /// Every title that occurs more than once, in order of first occurrence
    pub fn duplicate_titles(&self) -> Vec<&str> {
        let mut seen: IndexMap<&str, usize> = IndexMap::new();
        for entry in self.entries.iter() {
            *seen.entry(entry.title.as_str()).or_default() += 1;
        }
        seen.into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(title, _)| title)
            .collect()
    }

    /// The titles of every entry in file order, duplicates included
    pub fn titles(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.title.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileIndexEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[FileIndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    pub fn format(&self) -> MassSpectrometryFormat {
        self.format
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn statistics(&self) -> &IndexStatistics {
        &self.statistics
    }

    pub fn min_rt(&self) -> f64 {
        self.statistics.min_rt
    }

    pub fn max_rt(&self) -> f64 {
        self.statistics.max_rt
    }

    pub fn max_mz(&self) -> f64 {
        self.statistics.max_mz
    }

    pub fn max_charge(&self) -> i32 {
        self.statistics.max_charge
    }

    pub fn max_peak_count(&self) -> u32 {
        self.statistics.max_peak_count
    }

    pub fn max_intensity(&self) -> f64 {
        self.statistics.max_intensity
    }
}

impl<'a> IntoIterator for &'a FileIndex {
    type Item = &'a FileIndexEntry;
    type IntoIter = std::slice::Iter<'a, FileIndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn copy_fixture(dir: &Path, name: &str) -> PathBuf {
        let target = dir.join(name);
        fs::copy(Path::new("./test/data").join(name), &target).unwrap();
        target
    }

    #[test_log::test]
    fn test_build_mgf() -> Result<()> {
        let index = FileIndex::build("./test/data/small.mgf")?;
        assert_eq!(index.len(), 5);
        assert_eq!(index.file_name(), "small.mgf");
        assert_eq!(index.format(), MassSpectrometryFormat::MGF);
        assert_eq!(index.get("scan=2").unwrap().byte_offset, 155);
        assert_eq!(index.get_index(4).unwrap().title, "C:\\data\\run,1");
        assert_eq!(index.min_rt(), 60.5);
        assert_eq!(index.max_rt(), 100.0);
        assert_eq!(index.max_mz(), 801.4);
        assert_eq!(index.max_charge(), 3);
        assert_eq!(index.max_peak_count(), 4);
        assert_eq!(index.max_intensity(), 12000.5);
        assert!(index.duplicate_titles().is_empty());
        Ok(())
    }

    #[test_log::test]
    fn test_build_mzml() -> Result<()> {
        let index = FileIndex::build("./test/data/small.mzML")?;
        assert_eq!(index.len(), 3);
        assert_eq!(index.format(), MassSpectrometryFormat::MzML);
        let entry = index
            .get("controllerType=0 controllerNumber=1 scan=2")
            .unwrap();
        assert_eq!(entry.byte_offset, 1953);
        assert_eq!(entry.precursor_mz, 650.75);
        assert_eq!(index.min_rt(), 60.0);
        assert_eq!(index.max_rt(), 95.0);
        Ok(())
    }

    #[test_log::test]
    fn test_sidecar_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let index_path = index_file_name(&path).unwrap();
        assert!(!index_path.exists());

        let built = FileIndex::load_or_build(&path)?;
        assert!(index_path.exists());

        // Tamper with an offset to prove the second load reads the sidecar
        let mut tampered = built.clone();
        tampered.entries[0].byte_offset = 9999;
        tampered.write_sidecar(&index_path)?;
        let loaded = FileIndex::load_or_build(&path)?;
        assert_eq!(loaded.get("scan=1").unwrap().byte_offset, 9999);
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.get("survey"), built.get("survey"));
        Ok(())
    }

    #[test_log::test]
    fn test_stale_sidecar_rebuilds() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let index_path = index_file_name(&path).unwrap();
        let built = FileIndex::load_or_build(&path)?;

        let mut tampered = built.clone();
        tampered.entries[0].byte_offset = 9999;
        tampered.write_sidecar(&index_path)?;

        let handle = fs::OpenOptions::new().write(true).open(&path)?;
        handle.set_modified(SystemTime::now() + Duration::from_secs(120))?;
        drop(handle);

        let rebuilt = FileIndex::load_or_build(&path)?;
        assert_eq!(rebuilt.get("scan=1").unwrap().byte_offset, 27);
        assert_ne!(rebuilt.last_modified(), built.last_modified());

        let reread = FileIndex::from_reader(fs::File::open(&index_path)?).unwrap();
        assert_eq!(reread, rebuilt);
        Ok(())
    }

    #[test_log::test]
    fn test_corrupt_sidecar_rebuilds() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mzML");
        let index_path = index_file_name(&path).unwrap();
        fs::write(&index_path, b"{\"format_version\": 1, \"entries\": [")?;
        let index = FileIndex::load_or_build(&path)?;
        assert_eq!(index.len(), 3);
        let reread = FileIndex::from_reader(fs::File::open(&index_path)?).unwrap();
        assert_eq!(reread, index);
        Ok(())
    }

    #[test]
    fn test_persist_disabled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let index = FileIndex::load_or_build_with(&path, false)?;
        assert_eq!(index.len(), 5);
        assert!(!index_file_name(&path).unwrap().exists());
        Ok(())
    }

    #[test]
    fn test_cancelled_build() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cancel = AtomicBool::new(true);
        assert!(FileIndex::build_cancellable(&path, &cancel)?.is_none());
        assert!(!index_file_name(&path).unwrap().exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_titles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dups.mgf");
        fs::write(
            &path,
            "BEGIN IONS\nTITLE=a\nPEPMASS=400.0\n100.0 1.0\nEND IONS\n\
             BEGIN IONS\nTITLE=b\nPEPMASS=500.0\n100.0 1.0\nEND IONS\n\
             BEGIN IONS\nTITLE=a\nPEPMASS=600.0\n100.0 1.0\nEND IONS\n",
        )?;
        let index = FileIndex::build(&path)?;
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("a").unwrap().precursor_mz, 600.0);
        assert_eq!(index.ordinals_of("a"), vec![0, 2]);
        assert_eq!(index.duplicate_titles(), vec!["a"]);
        let titles: Vec<&str> = index.titles().collect();
        assert_eq!(titles, ["a", "b", "a"]);
        Ok(())
    }

    #[test]
    fn test_failures() {
        let err = FileIndex::build("./test/data/small.txt").unwrap_err();
        assert!(matches!(err, SpectrumCacheError::UnsupportedFormat(_)));
        let err = FileIndex::load_or_build("./test/data/missing.mgf").unwrap_err();
        assert!(err.is_not_found());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untitled.mgf");
        fs::write(&path, "BEGIN IONS\nPEPMASS=400.0\n100.0 1.0\nEND IONS\n").unwrap();
        let err = FileIndex::load_or_build(&path).unwrap_err();
        assert!(matches!(
            err,
            SpectrumCacheError::MissingTitle { offset: 0, .. }
        ));
        assert!(!index_file_name(&path).unwrap().exists());
    }
}
