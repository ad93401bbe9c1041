use std::fs::{File, OpenOptions};
use std::path::Path;
use crate::core::error::{Error, ErrorKind, Result};

/// Exclusive advisory lock on the store directory, enforcing at most one
/// writer per index across processes.
pub struct WriterLock {
    _file: File,
}

impl WriterLock {
    pub fn acquire(store_dir: &Path) -> Result<Self> {
        let lock_path = store_dir.join(".lock");
        let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            // Safety: fd is owned by `file` which outlives the call
            if unsafe { flock(fd, LOCK_EX | LOCK_NB) } != 0 {
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    format!("index store at {} is locked by another writer", store_dir.display()),
                ));
            }
        }

        Ok(WriterLock { _file: file })
    }
}

#[cfg(unix)]
impl Drop for WriterLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        use libc::{flock, LOCK_UN};

        unsafe {
            flock(self._file.as_raw_fd(), LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_within_process() {
        let dir = TempDir::new().unwrap();
        let first = WriterLock::acquire(dir.path()).unwrap();
        assert!(WriterLock::acquire(dir.path()).is_err());
        drop(first);
        assert!(WriterLock::acquire(dir.path()).is_ok());
    }
}
