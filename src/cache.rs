//! A bounded, thread-safe cache of spectra and precursors read on demand from
//! indexed source files.
//!
//! Files are registered with a [`SpectrumCache`] by path and known by their file
//! name. Spectra are requested by [`SpectrumKey`], read from their file through
//! the file's [`FileIndex`] under a [`RetryPolicy`](crate::io::RetryPolicy), and
//! kept until evicted in first-in, first-out order.
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::error::{Result, SpectrumCacheError};
use crate::io::{
    file_name_of, last_modified_millis, open_record_source_as, BoxedRecordSource, FileIndex,
    FileIndexEntry, RecordError, RetryError, RetryPolicy,
};
use crate::spectrum::{Precursor, Spectrum};
use crate::utils::{collapse_backslashes, percent_decode};

mod config;
mod key;
mod resident;

pub use config::{CacheConfig, SpectrumCacheBuilder};
pub use key::{SpectrumKey, KEY_SEPARATOR};

use resident::FifoStore;

/// A registered source file, its lazily built index and its open handle
struct FileSlot {
    path: PathBuf,
    index: Mutex<Option<Arc<FileIndex>>>,
    handle: Mutex<Option<BoxedRecordSource>>,
}

impl FileSlot {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            index: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }
}

/// Find the entry for `title`, trying the literal title, then its percent-decoded
/// form, then the form with doubled backslashes collapsed
fn resolve_entry<'a>(index: &'a FileIndex, title: &str) -> Option<&'a FileIndexEntry> {
    index
        .get(title)
        .or_else(|| percent_decode(title).and_then(|t| index.get(&t)))
        .or_else(|| collapse_backslashes(title).and_then(|t| index.get(&t)))
}

fn unexpected_title(spectrum: &Spectrum, entry: &FileIndexEntry) -> Result<(), RecordError> {
    if spectrum.title() == entry.title {
        Ok(())
    } else {
        Err(RecordError::UnexpectedRecord {
            offset: entry.byte_offset,
            expected: format!("{:?}", entry.title),
            found: format!("{:?}", spectrum.title()),
        })
    }
}

fn unexpected_precursor(
    precursor: &Option<Precursor>,
    entry: &FileIndexEntry,
) -> Result<(), RecordError> {
    match precursor {
        Some(precursor) if precursor.mz != entry.precursor_mz => {
            Err(RecordError::UnexpectedRecord {
                offset: entry.byte_offset,
                expected: format!("precursor m/z {}", entry.precursor_mz),
                found: format!("precursor m/z {}", precursor.mz),
            })
        }
        _ => Ok(()),
    }
}

/**
A bounded cache of [`Spectrum`] and [`Precursor`] values shared across threads.

Spectra and precursors are held in two separate stores, each with its own
capacity. When a store grows past its capacity the entries inserted earliest are
dropped, regardless of how recently they were read.

```no_run
use mzcache::prelude::*;

let cache = SpectrumCacheBuilder::default()
    .capacity(500)
    .file("./run.mgf")
    .build()?;
let spectrum = cache.get_or_load(&SpectrumKey::new("run.mgf", "scan=1"))?;
println!("{} has {} peaks", spectrum.title(), spectrum.peaks().len());
# Ok::<(), mzcache::SpectrumCacheError>(())
```
*/
pub struct SpectrumCache {
    retry: RetryPolicy,
    persist_indices: bool,
    files: RwLock<IndexMap<String, Arc<FileSlot>>>,
    spectra: Mutex<FifoStore<Spectrum>>,
    precursors: Mutex<FifoStore<Precursor>>,
}

impl Debug for SpectrumCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumCache")
            .field("retry", &self.retry)
            .field("persist_indices", &self.persist_indices)
            .field("files", &self.file_names())
            .field("len", &self.len())
            .field("precursor_len", &self.precursor_len())
            .finish()
    }
}

impl Default for SpectrumCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self {
            retry: config.retry,
            persist_indices: config.persist_indices,
            files: RwLock::new(IndexMap::new()),
            spectra: Mutex::new(FifoStore::new(config.capacity)),
            precursors: Mutex::new(FifoStore::new(config.precursor_capacity)),
        }
    }
}

impl SpectrumCache {
    pub fn builder() -> SpectrumCacheBuilder {
        SpectrumCacheBuilder::default()
    }

    pub fn from_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retry: config.retry,
            persist_indices: config.persist_indices,
            files: RwLock::new(IndexMap::new()),
            spectra: Mutex::new(FifoStore::new(config.capacity)),
            precursors: Mutex::new(FifoStore::new(config.precursor_capacity)),
        })
    }

    /// Register the file at `path` without reading it. Returns the file name the
    /// file's spectra are keyed by.
    ///
    /// Registering a different path with the same file name replaces the earlier
    /// registration and drops everything read from the earlier file.
    pub fn register_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let name = file_name_of(path).ok_or_else(|| {
            SpectrumCacheError::PreconditionViolation(format!(
                "{} does not name a file",
                path.display()
            ))
        })?;
        let replaced = {
            let mut files = self.files.write();
            let replaced = match files.get(&name) {
                Some(slot) if slot.path == path => return Ok(name),
                Some(slot) => {
                    warn!(
                        "Replacing {} with {} as the source of {name}",
                        slot.path.display(),
                        path.display()
                    );
                    true
                }
                None => false,
            };
            files.insert(name.clone(), Arc::new(FileSlot::new(path.to_path_buf())));
            replaced
        };
        if replaced {
            self.purge_file(&name);
        }
        Ok(name)
    }

    /// Register the file at `path` and build or load its index now
    pub fn add_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<FileIndex>> {
        let name = self.register_file(path)?;
        self.file_index(&name)
    }

    fn slot(&self, file_name: &str) -> Result<Arc<FileSlot>> {
        self.files
            .read()
            .get(file_name)
            .cloned()
            .ok_or_else(|| SpectrumCacheError::FileNotRegistered(file_name.to_string()))
    }

    fn index_of_slot(&self, slot: &FileSlot) -> Result<Arc<FileIndex>> {
        let mut index = slot.index.lock();
        if let Some(index) = index.as_ref() {
            return Ok(index.clone());
        }
        let built = Arc::new(FileIndex::load_or_build_with(
            &slot.path,
            self.persist_indices,
        )?);
        *index = Some(built.clone());
        Ok(built)
    }

    /// Forget the resident spectra and precursors read from `file_name`
    fn purge_file(&self, file_name: &str) {
        let spectra = self.spectra.lock().remove_file(file_name);
        let precursors = self.precursors.lock().remove_file(file_name);
        if spectra + precursors > 0 {
            debug!("Dropped {spectra} spectra and {precursors} precursors of {file_name}");
        }
    }

    /// Build the index of `slot` again from its file, closing its handle and
    /// dropping every resident value read under the old index
    fn rebuild_slot(&self, file_name: &str, slot: &FileSlot) -> Result<Arc<FileIndex>> {
        let mut index = slot.index.lock();
        slot.handle.lock().take();
        self.purge_file(file_name);
        let built = Arc::new(FileIndex::rebuild_with(&slot.path, self.persist_indices)?);
        *index = Some(built.clone());
        Ok(built)
    }

    /// The index of `slot`, rebuilt first if the file was modified after it was
    /// indexed
    fn current_index(&self, file_name: &str, slot: &FileSlot) -> Result<Arc<FileIndex>> {
        let index = self.index_of_slot(slot)?;
        match last_modified_millis(&slot.path) {
            Ok(modified) if modified != index.last_modified() => {
                debug!(
                    "{file_name} was modified after it was indexed ({} != {modified}), rebuilding",
                    index.last_modified()
                );
                self.rebuild_slot(file_name, slot)
            }
            // A file that can no longer be read is reported when it is opened
            _ => Ok(index),
        }
    }

    /// The index of the registered file `file_name`, building it if needed or if
    /// the file changed since it was built
    pub fn file_index(&self, file_name: &str) -> Result<Arc<FileIndex>> {
        let slot = self.slot(file_name)?;
        self.current_index(file_name, &slot)
    }

    /// The titles of every record in `file_name`, in file order
    pub fn spectrum_titles(&self, file_name: &str) -> Result<Vec<String>> {
        let index = self.file_index(file_name)?;
        Ok(index.titles().map(|t| t.to_string()).collect())
    }

    /// Index every registered file that has not been indexed yet
    #[cfg(not(feature = "parallelism"))]
    pub fn index_all(&self) -> Result<()> {
        let slots: Vec<Arc<FileSlot>> = self.files.read().values().cloned().collect();
        for slot in slots {
            self.index_of_slot(&slot)?;
        }
        Ok(())
    }

    /// Index every registered file that has not been indexed yet, several files at
    /// a time
    #[cfg(feature = "parallelism")]
    pub fn index_all(&self) -> Result<()> {
        let slots: Vec<Arc<FileSlot>> = self.files.read().values().cloned().collect();
        slots
            .par_iter()
            .map(|slot| self.index_of_slot(slot).map(|_| ()))
            .collect()
    }

    /// Read the record for `key` at the offset its file's index gives, checking the
    /// value read against the index entry with `verify`. If the record is not
    /// where the index places it, the index is rebuilt and the read made once more.
    fn read_indexed<T, F, V>(&self, key: &SpectrumKey, mut read: F, verify: V) -> Result<T>
    where
        F: FnMut(&mut BoxedRecordSource, u64) -> Result<T, RecordError>,
        V: Fn(&T, &FileIndexEntry) -> Result<(), RecordError>,
    {
        let slot = self.slot(&key.file)?;
        let mut index = self.current_index(&key.file, &slot)?;
        let mut rebuilt = false;
        loop {
            let entry = resolve_entry(&index, &key.title).ok_or_else(|| {
                SpectrumCacheError::SpectrumNotFound {
                    file: key.file.clone(),
                    title: key.title.clone(),
                }
            })?;
            let result = self.read_record(&slot, &index, key, entry.byte_offset, |source, offset| {
                let value = read(source, offset)?;
                verify(&value, entry)?;
                Ok(value)
            });
            match result {
                Err(SpectrumCacheError::Malformed { source, .. })
                    if !rebuilt && source.is_misplaced() =>
                {
                    warn!(
                        "The index of {} does not match the file ({source}), rebuilding it",
                        key.file
                    );
                    index = self.rebuild_slot(&key.file, &slot)?;
                    rebuilt = true;
                }
                result => return result,
            }
        }
    }

    /// Read from the record at `offset` of `slot` with retries, opening the file if
    /// it is not already open
    fn read_record<T, F>(
        &self,
        slot: &FileSlot,
        index: &FileIndex,
        key: &SpectrumKey,
        offset: u64,
        mut read: F,
    ) -> Result<T>
    where
        F: FnMut(&mut BoxedRecordSource, u64) -> Result<T, RecordError>,
    {
        let mut handle = slot.handle.lock();
        let source = match handle.as_mut() {
            Some(source) => source,
            None => handle.insert(open_record_source_as(&slot.path, index.format())?),
        };
        match self.retry.run(|| read(source, offset)) {
            Ok(value) => Ok(value),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                // Reopen on the next read in case the handle itself went bad
                *handle = None;
                Err(SpectrumCacheError::RetriesExhausted {
                    file: key.file.clone(),
                    title: key.title.clone(),
                    attempts,
                    source: last_error,
                })
            }
            Err(RetryError::Fatal(e)) => Err(SpectrumCacheError::Malformed {
                file: key.file.clone(),
                title: key.title.clone(),
                source: e,
            }),
        }
    }

    /// Get the spectrum for `key`, reading it from its file if it is not resident
    pub fn get_or_load(&self, key: &SpectrumKey) -> Result<Arc<Spectrum>> {
        if let Some(spectrum) = self.spectra.lock().get(key) {
            trace!("Cache hit for {key}");
            return Ok(spectrum);
        }
        let spectrum = self.read_indexed(
            key,
            |source, offset| source.read_spectrum_at(offset),
            unexpected_title,
        )?;
        let (spectrum, evicted) = self.spectra.lock().insert(key.clone(), Arc::new(spectrum));
        if !evicted.is_empty() {
            debug!("Evicted {} spectra to make room for {key}", evicted.len());
        }
        Ok(spectrum)
    }

    /// Get the precursor of the spectrum for `key`, reading only the record's
    /// header if the spectrum is not resident
    pub fn get_precursor_only(&self, key: &SpectrumKey) -> Result<Arc<Precursor>> {
        if let Some(precursor) = self.precursors.lock().get(key) {
            trace!("Precursor cache hit for {key}");
            return Ok(precursor);
        }
        let resident = self.spectra.lock().get(key);
        let precursor = match resident {
            Some(spectrum) => spectrum.precursor().cloned(),
            None => self.read_indexed(
                key,
                |source, offset| source.read_precursor_at(offset),
                unexpected_precursor,
            )?,
        };
        let precursor = precursor.ok_or_else(|| SpectrumCacheError::NoPrecursor(key.clone()))?;
        let (precursor, evicted) = self
            .precursors
            .lock()
            .insert(key.clone(), Arc::new(precursor));
        if !evicted.is_empty() {
            debug!("Evicted {} precursors to make room for {key}", evicted.len());
        }
        Ok(precursor)
    }

    /// Change the most spectra held at once, evicting down to it immediately
    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The spectrum cache capacity must be at least 1".into(),
            ));
        }
        let evicted = self.spectra.lock().set_capacity(capacity);
        debug!(
            "Resized the spectrum cache to {capacity}, evicting {}",
            evicted.len()
        );
        Ok(())
    }

    /// Change the most precursors held at once, evicting down to it immediately
    pub fn resize_precursors(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The precursor cache capacity must be at least 1".into(),
            ));
        }
        self.precursors.lock().set_capacity(capacity);
        Ok(())
    }

    /// Drop every resident spectrum and precursor. Registered files stay open.
    pub fn empty_cache(&self) {
        self.spectra.lock().clear();
        self.precursors.lock().clear();
    }

    /// Close every open file handle. Files are reopened when next read.
    pub fn close_files(&self) {
        for slot in self.files.read().values() {
            slot.handle.lock().take();
        }
    }

    /// Drop every resident value and forget every registered file
    pub fn clear(&self) {
        self.empty_cache();
        self.close_files();
        self.files.write().clear();
    }

    /// The number of resident spectra
    pub fn len(&self) -> usize {
        self.spectra.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of resident precursors
    pub fn precursor_len(&self) -> usize {
        self.precursors.lock().len()
    }

    /// Whether the spectrum for `key` is resident
    pub fn contains(&self, key: &SpectrumKey) -> bool {
        self.spectra.lock().contains(key)
    }

    /// The keys of the resident spectra from the next to be evicted to the newest
    pub fn resident_keys(&self) -> Vec<SpectrumKey> {
        self.spectra.lock().keys().cloned().collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.spectra.lock().capacity()
    }

    pub fn precursor_capacity(&self) -> usize {
        self.precursors.lock().capacity()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    #[cfg(test)]
    fn install_source(&self, file_name: &str, source: BoxedRecordSource) -> Result<()> {
        let slot = self.slot(file_name)?;
        *slot.handle.lock() = Some(source);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::{index_file_name, SpectrumRecordSource};
    use crate::io::FileIndexEntry;
    use std::io;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use std::{fs, thread};

    fn copy_fixture(dir: &Path, name: &str) -> PathBuf {
        let target = dir.join(name);
        fs::copy(Path::new("./test/data").join(name), &target).unwrap();
        target
    }

    fn mgf_key(title: &str) -> SpectrumKey {
        SpectrumKey::new("small.mgf", title)
    }

    /// A source whose reads always fail with an I/O error
    struct FailingSource;

    impl SpectrumRecordSource for FailingSource {
        fn scan_entries(
            &mut self,
            _cancel: &AtomicBool,
        ) -> Result<Option<Vec<FileIndexEntry>>, RecordError> {
            Ok(Some(Vec::new()))
        }

        fn read_spectrum_at(&mut self, _offset: u64) -> Result<Spectrum, RecordError> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "network share went away").into())
        }

        fn read_precursor_at(&mut self, _offset: u64) -> Result<Option<Precursor>, RecordError> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "network share went away").into())
        }
    }

    #[test_log::test]
    fn test_two_records_with_capacity_one() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().capacity(1).file(&path).build()?;

        let a = mgf_key("scan=1");
        let b = mgf_key("scan=2");
        let first_a = cache.get_or_load(&a)?;
        assert!(cache.contains(&a));
        let first_b = cache.get_or_load(&b)?;
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert_eq!(cache.len(), 1);

        let second_a = cache.get_or_load(&a)?;
        assert!(!Arc::ptr_eq(&first_a, &second_a));
        assert_eq!(*first_a, *second_a);
        assert_ne!(*first_a, *first_b);
        assert!(index_file_name(&path).unwrap().exists());
        Ok(())
    }

    #[test_log::test]
    fn test_hits_do_not_reorder() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().capacity(2).file(&path).build()?;

        let k1 = mgf_key("scan=1");
        let k2 = mgf_key("scan=2");
        let k3 = mgf_key("survey");
        let hit = cache.get_or_load(&k1)?;
        cache.get_or_load(&k2)?;
        assert!(Arc::ptr_eq(&hit, &cache.get_or_load(&k1)?));
        cache.get_or_load(&k3)?;
        assert_eq!(cache.resident_keys(), vec![k2, k3]);
        Ok(())
    }

    #[test_log::test]
    fn test_title_normalization() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().persist_indices(false).build()?;
        cache.add_file(&path)?;

        let spectrum = cache.get_or_load(&mgf_key("Spectrum%203%20File:%22run.raw%22,%20NativeID:%22scan=3%22"))?;
        assert_eq!(
            spectrum.title(),
            "Spectrum 3 File:\"run.raw\", NativeID:\"scan=3\""
        );
        let spectrum = cache.get_or_load(&mgf_key("C:\\\\data\\\\run,1"))?;
        assert_eq!(spectrum.title(), "C:\\data\\run,1");
        assert!(!index_file_name(&path).unwrap().exists());
        Ok(())
    }

    #[test_log::test]
    fn test_literal_title_preferred() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("literal.mgf");
        fs::write(
            &path,
            "BEGIN IONS\nTITLE=run%201\nPEPMASS=400.0\n100.0 1.0\nEND IONS\n\
             BEGIN IONS\nTITLE=run 1\nPEPMASS=500.0\n100.0 1.0\nEND IONS\n\
             BEGIN IONS\nTITLE=C:\\\\raw\nPEPMASS=600.0\n100.0 1.0\nEND IONS\n\
             BEGIN IONS\nTITLE=C:\\raw\nPEPMASS=700.0\n100.0 1.0\nEND IONS\n",
        )?;
        let cache = SpectrumCache::builder().file(&path).build()?;
        let mz_of = |title: &str| -> Result<f64> {
            let spectrum = cache.get_or_load(&SpectrumKey::new("literal.mgf", title))?;
            assert_eq!(spectrum.title(), title);
            Ok(spectrum.precursor().map(|p| p.mz).unwrap_or_default())
        };
        assert_eq!(mz_of("run%201")?, 400.0);
        assert_eq!(mz_of("run 1")?, 500.0);
        assert_eq!(mz_of("C:\\\\raw")?, 600.0);
        assert_eq!(mz_of("C:\\raw")?, 700.0);
        Ok(())
    }

    #[test_log::test]
    fn test_source_rewritten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().build()?;
        assert_eq!(cache.add_file(&path)?.len(), 5);
        let survey = mgf_key("survey");
        cache.get_or_load(&survey)?;

        // Drop the first record, moving every later record
        let text = fs::read(&path)?;
        let mut rewritten = text[..27].to_vec();
        rewritten.extend_from_slice(&text[155..]);
        fs::write(&path, rewritten)?;
        cache.close_files();

        let precursor = cache.get_precursor_only(&mgf_key("scan=2"))?;
        assert_eq!(precursor.mz, 650.75);
        assert!(!cache.contains(&survey));

        let spectrum = cache.get_or_load(&mgf_key("scan=2"))?;
        assert_eq!(spectrum.title(), "scan=2");
        assert_eq!(spectrum.peaks().len(), 2);
        let err = cache.get_or_load(&mgf_key("scan=1")).unwrap_err();
        assert!(matches!(err, SpectrumCacheError::SpectrumNotFound { .. }));
        assert_eq!(cache.file_index("small.mgf")?.len(), 4);
        assert_eq!(cache.resident_keys(), vec![mgf_key("scan=2")]);
        Ok(())
    }

    #[test_log::test]
    fn test_title_checked_against_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().file(&path).build()?;
        cache.file_index("small.mgf")?;
        let modified = fs::metadata(&path)?.modified()?;

        // The same length and modification time, but a different title
        let text = fs::read_to_string(&path)?;
        fs::write(&path, text.replacen("TITLE=scan=1", "TITLE=scan=9", 1))?;
        fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(modified)?;

        let err = cache.get_or_load(&mgf_key("scan=1")).unwrap_err();
        assert!(matches!(err, SpectrumCacheError::SpectrumNotFound { .. }));
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_load(&mgf_key("scan=9"))?.title(), "scan=9");
        Ok(())
    }

    #[test_log::test]
    fn test_replaced_registration() -> Result<()> {
        let first = tempfile::tempdir()?;
        let second = tempfile::tempdir()?;
        let path = copy_fixture(first.path(), "small.mgf");
        let cache = SpectrumCache::builder().file(&path).build()?;
        let key = mgf_key("scan=1");
        cache.get_or_load(&key)?;
        assert_eq!(cache.get_precursor_only(&key)?.mz, 500.25);

        let other = second.path().join("small.mgf");
        let text = fs::read_to_string(&path)?;
        fs::write(&other, text.replacen("PEPMASS=500.25", "PEPMASS=500.5", 1))?;
        cache.register_file(&other)?;
        assert!(!cache.contains(&key));
        assert_eq!(cache.precursor_len(), 0);

        assert_eq!(cache.get_precursor_only(&key)?.mz, 500.5);
        assert_eq!(
            cache.get_or_load(&key)?.precursor().map(|p| p.mz),
            Some(500.5)
        );
        Ok(())
    }

    #[test_log::test]
    fn test_not_found() -> Result<()> {
        let cache = SpectrumCache::default();
        let err = cache.get_or_load(&mgf_key("scan=1")).unwrap_err();
        assert!(matches!(err, SpectrumCacheError::FileNotRegistered(_)));

        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        cache.register_file(&path)?;
        let err = cache.get_or_load(&mgf_key("scan=404")).unwrap_err();
        assert!(matches!(err, SpectrumCacheError::SpectrumNotFound { .. }));
        assert!(err.is_not_found());
        assert!(cache.is_empty());

        cache.register_file(dir.path().join("gone.mgf"))?;
        let err = cache
            .get_or_load(&SpectrumKey::new("gone.mgf", "scan=1"))
            .unwrap_err();
        assert!(matches!(err, SpectrumCacheError::FileNotFound { .. }));
        Ok(())
    }

    #[test_log::test]
    fn test_precursor_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mzML");
        let cache = SpectrumCache::builder().file(&path).build()?;

        let key = SpectrumKey::new("small.mzML", "controllerType=0 controllerNumber=1 scan=2");
        let precursor = cache.get_precursor_only(&key)?;
        assert_eq!(precursor.mz, 650.75);
        assert_eq!(cache.precursor_len(), 1);
        assert!(!cache.contains(&key));
        assert!(Arc::ptr_eq(&precursor, &cache.get_precursor_only(&key)?));

        // A resident spectrum supplies the precursor without another read
        let other = SpectrumKey::new("small.mzML", "controllerType=0 controllerNumber=1 scan=3");
        let spectrum = cache.get_or_load(&other)?;
        let precursor = cache.get_precursor_only(&other)?;
        assert_eq!(Some(&*precursor), spectrum.precursor());

        let ms1 = SpectrumKey::new("small.mzML", "controllerType=0 controllerNumber=1 scan=1");
        let err = cache.get_precursor_only(&ms1).unwrap_err();
        assert!(matches!(err, SpectrumCacheError::NoPrecursor(_)));
        assert_eq!(cache.precursor_len(), 2);
        Ok(())
    }

    #[test_log::test]
    fn test_retries_exhausted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(4))?;
        let cache = SpectrumCache::builder().retry_policy(policy).build()?;
        cache.add_file(&path)?;
        cache.install_source("small.mgf", Box::new(FailingSource))?;

        let err = cache.get_or_load(&mgf_key("scan=1")).unwrap_err();
        match err {
            SpectrumCacheError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            e => panic!("Expected retry exhaustion, got {e}"),
        }
        assert!(cache.is_empty());

        // The failed handle was dropped, so the next read reopens the file
        assert_eq!(cache.get_or_load(&mgf_key("scan=1"))?.title(), "scan=1");
        Ok(())
    }

    #[test_log::test]
    fn test_lifecycle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = SpectrumCache::builder().file(&path).build()?;
        for title in cache.spectrum_titles("small.mgf")? {
            cache.get_or_load(&mgf_key(&title))?;
        }
        assert_eq!(cache.len(), 5);

        cache.resize(2)?;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert!(cache.resize(0).is_err());

        cache.close_files();
        assert_eq!(cache.get_or_load(&mgf_key("scan=1"))?.title(), "scan=1");

        cache.empty_cache();
        assert!(cache.is_empty());
        assert_eq!(cache.file_names(), vec!["small.mgf".to_string()]);

        cache.clear();
        assert!(cache.file_names().is_empty());
        assert!(cache.get_or_load(&mgf_key("scan=1")).is_err());
        Ok(())
    }

    #[test_log::test]
    fn test_index_all() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mgf = copy_fixture(dir.path(), "small.mgf");
        let mzml = copy_fixture(dir.path(), "small.mzML");
        let cache = SpectrumCache::builder().file(&mgf).file(&mzml).build()?;
        cache.index_all()?;
        assert!(index_file_name(&mgf).unwrap().exists());
        assert!(index_file_name(&mzml).unwrap().exists());
        assert_eq!(cache.file_index("small.mzML")?.len(), 3);
        Ok(())
    }

    #[test_log::test]
    fn test_shared_between_threads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = copy_fixture(dir.path(), "small.mgf");
        let cache = Arc::new(SpectrumCache::builder().capacity(3).file(&path).build()?);
        let titles = cache.spectrum_titles("small.mgf")?;

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                let titles = titles.clone();
                thread::spawn(move || {
                    for j in 0..20 {
                        let title = &titles[(i + j) % titles.len()];
                        let spectrum = cache.get_or_load(&mgf_key(title)).unwrap();
                        assert_eq!(spectrum.title(), title);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 3);
        assert_eq!(cache.resident_keys().len(), cache.len());
        Ok(())
    }
}
