//! Per-entry advisory file locks.
//!
//! Each cache entry `<stem>.json` has a sibling `<stem>.json.lock` marker.
//! Holders take an exclusive `flock` on the marker, so threads and processes
//! contend only when they touch the same entry.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::CacheError;

/// Poll interval while waiting for a contended lock.
const LOCK_POLL: Duration = Duration::from_millis(20);

/// Lock marker path for an entry file.
pub(crate) fn lock_path(entry: &Path) -> PathBuf {
    let mut name = entry.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// An exclusive lock on one entry, released on drop.
pub(crate) struct EntryLock {
    file: File,
}

impl EntryLock {
    /// Acquire the lock for `entry`, waiting at most `timeout`.
    pub(crate) fn acquire(entry: &Path, timeout: Duration) -> Result<Self, CacheError> {
        let path = lock_path(entry);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let started = Instant::now();
        loop {
            if try_flock_exclusive(&file)? {
                return Ok(Self { file });
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(CacheError::LockTimeout { path, waited });
            }
            std::thread::sleep(LOCK_POLL.min(timeout - waited));
        }
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        unlock(&self.file);
    }
}

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if another holder
/// has it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by `file` for the duration
        // of the call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

fn unlock(file: &File) {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: as above; closing the descriptor would also release it.
        #[allow(unsafe_code)]
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
}
