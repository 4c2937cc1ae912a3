use super::RotationError;
use fs2::FileExt;
use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Exclusive advisory lock held for the whole read-backup-write sequence.
///
/// The lock file (`<config>.lock`) is left in place on release; only the lock is dropped.
#[derive(Debug)]
pub struct RotationLock {
    file: File,
    path: PathBuf,
}

impl RotationLock {
    /// Try to take the lock without blocking.
    ///
    /// # Errors
    /// Returns `RotationError::Locked` if another rotation holds it, or an I/O error.
    pub fn acquire(config_path: &Path) -> Result<Self, RotationError> {
        let path = lock_path(config_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| RotationError::io("open lock file", &path, source))?;

        FileExt::try_lock_exclusive(&file).map_err(|source| {
            if source.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                RotationError::Locked(path.clone())
            } else {
                RotationError::io("lock", &path, source)
            }
        })?;

        debug!("acquired rotation lock {}", path.display());

        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RotationLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(config_path: &Path) -> PathBuf {
    let mut name = config_path
        .file_name()
        .map_or_else(|| OsString::from("config"), OsString::from);
    name.push(".lock");
    config_path.with_file_name(name)
}
