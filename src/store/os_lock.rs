// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! OS-level locks on open map file handles.
//!
//! These sit beneath the advisory lock records: readers take a shared lock for the duration of
//! the raw read, writers take an exclusive lock without waiting. Locks are `flock` locks and are
//! released when the guard (and with it the file handle) is dropped.

use std::fs::File;
use std::io::{self, Read, Write};

/// A file handle holding an OS-level lock.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Waits for a shared lock on `file`. There is no timeout.
    pub fn shared(file: File) -> io::Result<Self> {
        flock_shared_blocking(&file)?;
        Ok(Self { file })
    }

    /// Takes an exclusive lock on `file` without waiting.
    ///
    /// Returns `Ok(None)` when another handle holds a conflicting lock.
    pub fn try_exclusive(file: File) -> io::Result<Option<Self>> {
        if try_flock_exclusive(&file)? {
            Ok(Some(Self { file }))
        } else {
            Ok(None)
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Read for LockedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(unix)]
fn flock_shared_blocking(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_SH) };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file`, which outlives the call.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(not(unix))]
fn flock_shared_blocking(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs::{self, File, OpenOptions};

    use tempfile::TempDir;

    use super::LockedFile;

    #[test]
    fn exclusive_lock_conflicts_with_second_handle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.mm");
        fs::write(&path, "x").unwrap();

        let first = LockedFile::try_exclusive(OpenOptions::new().write(true).open(&path).unwrap())
            .unwrap();
        assert!(first.is_some());

        let second =
            LockedFile::try_exclusive(OpenOptions::new().write(true).open(&path).unwrap()).unwrap();
        assert!(second.is_none());

        drop(first);
        let third =
            LockedFile::try_exclusive(OpenOptions::new().write(true).open(&path).unwrap()).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn shared_lock_blocks_exclusive_writer() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.mm");
        fs::write(&path, "x").unwrap();

        let reader = LockedFile::shared(File::open(&path).unwrap()).unwrap();
        let writer =
            LockedFile::try_exclusive(OpenOptions::new().write(true).open(&path).unwrap()).unwrap();
        assert!(writer.is_none());
        drop(reader);
    }
}
