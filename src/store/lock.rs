use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};

/// Lock file guarding a database: `<db>.lock` next to it.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive lock held for the duration of a migration run.
/// The lock is released when the value is dropped.
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = lock_path_for(db_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| MigrateError::Locked(path.display().to_string()))?;

        Ok(Self { file })
    }

    /// Release explicitly (normally handled by Drop).
    pub fn release(self) -> Result<()> {
        self.file.unlock()?;
        Ok(())
    }
}
