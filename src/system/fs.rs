//! Filesystem convenience wrappers, mapping `std::io::Error` into
//! [`crate::error::Error`].

use filetime::FileTime;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| Error::ReadFile(path.display().to_string(), e))
}

pub fn write_file<P: AsRef<Path>, S: AsRef<[u8]>>(path: P, content: S) -> Result<(), Error> {
    let path = path.as_ref();
    std::fs::write(path, content).map_err(|e| Error::WriteFile(path.display().to_string(), e))
}

pub fn ensure_directory<P: AsRef<Path>>(path: P) -> Result<(), Error> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path)
        .map_err(|e| Error::CreateDirectory(path.display().to_string(), e))
}

/// Modification time expressed as whole milliseconds since the epoch,
/// matching the granularity the sticky-attribute cache keys on.
pub fn mtime_millis<P: AsRef<Path>>(path: P) -> Result<i64, Error> {
    let path = path.as_ref();
    let metadata = path
        .metadata()
        .map_err(|e| Error::Stat(path.display().to_string(), e))?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    Ok(mtime.seconds() * 1000 + i64::from(mtime.nanoseconds() / 1_000_000))
}

pub trait PathExt {
    /// Relative path from `base` to `self`. `base` must be absolute.
    fn relative_to<P: AsRef<Path>>(&self, base: P) -> PathBuf;
}

impl<P> PathExt for P
where
    P: AsRef<Path>,
{
    fn relative_to<B: AsRef<Path>>(&self, base: B) -> PathBuf {
        let path = self.as_ref();
        let base = base.as_ref();
        pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
    }
}
