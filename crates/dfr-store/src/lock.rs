//! Cross-process lock file guarding a JSONL store.
//!
//! The lock is a sibling `<path>.lock` created with `O_EXCL`; dropping the
//! guard removes it. Acquisition retries briefly, then reports `LockBusy`.

use crate::error::StoreError;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOCK_RETRY_ATTEMPTS: u32 = 50;
pub const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut path: OsString = store_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

#[derive(Debug)]
pub struct StoreLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl StoreLockGuard {
    /// Single attempt.
    pub fn try_acquire(store_path: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path(store_path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| lock_io(&lock_path, e.to_string()))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(StoreError::LockBusy {
                lock_path: lock_path.display().to_string(),
            }),
            Err(err) => Err(lock_io(&lock_path, err.to_string())),
        }
    }

    /// Blocking acquire with bounded retries. Call from a blocking context.
    pub fn acquire(store_path: &Path, attempts: u32, delay: Duration) -> Result<Self, StoreError> {
        let mut attempt = 0;
        loop {
            match Self::try_acquire(store_path) {
                Err(StoreError::LockBusy { .. }) if attempt + 1 < attempts => {
                    attempt += 1;
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn lock_io(lock_path: &Path, message: String) -> StoreError {
    StoreError::LockIo {
        lock_path: lock_path.display().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::temp_path;

    #[test]
    fn second_holder_is_busy_until_release() {
        let path = temp_path("lock");
        let guard = StoreLockGuard::try_acquire(&path).expect("first acquire");
        assert!(lock_path(&path).exists());

        match StoreLockGuard::acquire(&path, 2, Duration::from_millis(1)) {
            Err(StoreError::LockBusy { lock_path }) => assert!(lock_path.ends_with(".lock")),
            other => panic!("expected busy lock, got {other:?}"),
        }

        drop(guard);
        assert!(!lock_path(&path).exists());
        let again = StoreLockGuard::try_acquire(&path).expect("re-acquire after release");
        drop(again);

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
