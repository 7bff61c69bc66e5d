use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// The extension appended to a source file's name to name its sidecar index
pub const INDEX_FILE_EXTENSION: &str = "index.json";

/// How much of a record a reader should decode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailLevel {
    /// Decode the metadata and every peak
    #[default]
    Full,
    /// Decode only the metadata, stopping before the peak data
    MetadataOnly,
}

/// The file name component of `path` as an owned string, the name a source file
/// is known by in spectrum keys
pub fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|s| s.to_string_lossy().into_owned())
}

/// The path of the sidecar index of `path`, `<file_name>.index.json` in the
/// same directory
pub fn index_file_name(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let mut index_name = name.to_os_string();
    index_name.push(".");
    index_name.push(INDEX_FILE_EXTENSION);
    Some(path.with_file_name(index_name))
}

/// The modification time of the file at `path` in milliseconds since the Unix epoch.
/// Times before the epoch are negative.
pub fn last_modified_millis(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Ok(millis)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_file_name() {
        let path = Path::new("/data/run/small.mgf");
        assert_eq!(
            index_file_name(path).unwrap(),
            PathBuf::from("/data/run/small.mgf.index.json")
        );
        assert_eq!(file_name_of(path).unwrap(), "small.mgf");
        assert!(index_file_name(Path::new("/")).is_none());
    }

    #[test]
    fn test_last_modified() -> io::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let stamp = last_modified_millis(file.path())?;
        assert!(stamp > 0);
        Ok(())
    }
}
