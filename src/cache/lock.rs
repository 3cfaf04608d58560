//! Per-key advisory file locks
//!
//! Each cache key has a lock file in a directory beside the cache root, so
//! clearing the cache never unlinks a lock someone holds. The lock is an OS
//! advisory lock (`flock` on Unix, `LockFileEx` on Windows) held on an open
//! file handle, so it is released when the handle closes, including when the
//! holding process dies. A lock file left on disk after a crash is therefore
//! inert: the next caller simply acquires it.
//!
//! Locks are taken per open handle, so two threads of the same process
//! exclude each other as well as two processes do.

use crate::error::{LayerError, LayerResult};
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exclusive lock held until dropped
#[derive(Debug)]
pub struct KeyLock {
    file: File,
    path: PathBuf,
}

#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

fn is_contended(err: &io::Error) -> bool {
    #[cfg(windows)]
    if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION) {
        return true;
    }
    err.kind() == io::ErrorKind::WouldBlock
}

impl KeyLock {
    /// Acquire the lock at `path`, polling every `poll` until `timeout` elapses
    ///
    /// `name` is used for error reporting only.
    pub fn acquire(
        path: &Path,
        name: &str,
        timeout: Duration,
        poll: Duration,
    ) -> LayerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LayerError::io(format!("creating lock dir {}", parent.display()), e)
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LayerError::io(format!("opening lock {}", path.display()), e))?;

        let started = Instant::now();
        let mut logged = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired lock {} after {:?}", path.display(), started.elapsed());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LayerError::CacheLock {
                            key: name.to_string(),
                            waited,
                        });
                    }
                    if !logged {
                        debug!("Waiting for lock on {} held by another fetch", name);
                        logged = true;
                    }
                    thread::sleep(poll.min(timeout - waited));
                }
                Err(e) => {
                    return Err(LayerError::io(format!("locking {}", path.display()), e));
                }
            }
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the handle below releases it anyway
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn second_acquire_times_out_while_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locks").join("k.lock");

        let held = KeyLock::acquire(&path, "k", Duration::from_secs(1), POLL).unwrap();
        let err = KeyLock::acquire(&path, "k", Duration::from_millis(50), POLL).unwrap_err();
        assert!(matches!(err, LayerError::CacheLock { ref key, .. } if key == "k"));

        drop(held);
        assert!(KeyLock::acquire(&path, "k", Duration::from_millis(50), POLL).is_ok());
    }

    #[test]
    fn leftover_lock_file_is_not_a_held_lock() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stale.lock");
        fs::write(&path, b"").unwrap();

        assert!(KeyLock::acquire(&path, "stale", Duration::ZERO, POLL).is_ok());
    }

    #[test]
    fn waiter_proceeds_once_released() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("k.lock");

        let held = KeyLock::acquire(&path, "k", Duration::from_secs(1), POLL).unwrap();
        let waiter = {
            let path = path.clone();
            thread::spawn(move || {
                KeyLock::acquire(&path, "k", Duration::from_secs(5), POLL).is_ok()
            })
        };
        thread::sleep(Duration::from_millis(30));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}
