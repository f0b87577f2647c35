// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Advisory lock records for map files.
//!
//! A lock record is a small JSON marker stored next to the map file (`.~<name>.lock`). It names
//! the user, host and process that intend to edit the map. The record is advisory: the OS-level
//! locks in [`super::os_lock`] guard the file content itself.
//!
//! Staleness:
//! - Records written on this host by a process that no longer exists are stale.
//! - Records from another host (or when process liveness cannot be checked) are stale once
//!   their timestamp is older than the configured threshold. Holders refresh their record
//!   periodically so a live lock never ages out.
//! - Records that cannot be decoded are judged by the marker file's modification time, and are
//!   reported as held by `"unknown"` while fresh.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(5 * 60);

const LOCK_FILE_PREFIX: &str = ".~";
const LOCK_FILE_SUFFIX: &str = ".lock";
const UNKNOWN_HOLDER: &str = "unknown";

static NEXT_LOCK_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("cannot create lock record {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read lock record {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot remove lock record {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot derive a lock record name from {path:?}")]
    InvalidPath { path: PathBuf },
}

/// Identity of a lock session.
///
/// Two lock managers in the same process are different sessions, so a second document opened
/// on an already locked file sees contention rather than sharing the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub user: String,
    pub host: String,
    pub pid: u32,
    pub session: u64,
}

impl LockOwner {
    /// Identity for a new lock session of the current process.
    pub fn current() -> Self {
        Self {
            user: current_user(),
            host: current_host(),
            pid: std::process::id(),
            session: NEXT_LOCK_SESSION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Name shown to users when this owner blocks them.
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn is_same_session(&self, other: &LockOwner) -> bool {
        self.session == other.session && self.pid == other.pid && self.host == other.host
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: LockOwner,
    pub created_at_ms: u64,
}

impl LockRecord {
    /// Time since the record was written. Records from the future count as fresh.
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.created_at_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Holder {
    Own,
    Live(String),
    Stale(String),
    Vanished,
}

/// Per-document advisory lock state.
///
/// A manager holds at most one record at a time; once a record for another file is claimed the
/// previous one is released. A switch started with [`LockManager::begin_switch`] keeps the
/// previous record until it is committed or rolled back. The held record is removed when the
/// manager is dropped.
#[derive(Debug)]
pub struct LockManager {
    owner: LockOwner,
    stale_after: Duration,
    held: Option<PathBuf>,
    refreshed_at: Option<Instant>,
    stale_owner: Option<String>,
    switch: Option<PendingSwitch>,
}

/// Record held before an uncommitted switch to another file.
#[derive(Debug)]
struct PendingSwitch {
    previous: Option<PathBuf>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_LOCK_AFTER)
    }
}

impl LockManager {
    pub fn new(stale_after: Duration) -> Self {
        Self::with_owner(LockOwner::current(), stale_after)
    }

    pub fn with_owner(owner: LockOwner, stale_after: Duration) -> Self {
        Self {
            owner,
            stale_after,
            held: None,
            refreshed_at: None,
            stale_owner: None,
            switch: None,
        }
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Path of the record currently held, if any.
    pub fn locked_record(&self) -> Option<&Path> {
        self.held.as_deref()
    }

    /// Attempts to claim the lock record for `file`.
    ///
    /// Returns `Ok(None)` when the lock is held by this session afterwards, or
    /// `Ok(Some(name))` naming the live holder. Stale records are removed and their owner kept
    /// for [`LockManager::pop_stale_lock_owner`].
    pub fn try_lock(&mut self, file: &Path) -> Result<Option<String>, LockError> {
        self.claim(file, false)
    }

    /// Like [`LockManager::try_lock`], but a previously held record for another file stays in
    /// place until [`LockManager::commit_switch`] or [`LockManager::rollback_switch`].
    pub fn begin_switch(&mut self, file: &Path) -> Result<Option<String>, LockError> {
        self.claim(file, true)
    }

    /// Releases the record left behind by [`LockManager::begin_switch`].
    pub fn commit_switch(&mut self) -> Result<(), LockError> {
        match self.switch.take() {
            Some(PendingSwitch {
                previous: Some(previous),
            }) => self.remove_own_record(&previous),
            _ => Ok(()),
        }
    }

    /// Gives up the record claimed by [`LockManager::begin_switch`] and holds the previous one
    /// again. Returns whether a switch was undone.
    pub fn rollback_switch(&mut self) -> Result<bool, LockError> {
        let Some(PendingSwitch { previous }) = self.switch.take() else {
            return Ok(false);
        };
        let claimed = std::mem::replace(&mut self.held, previous);
        self.refreshed_at = self.held.as_ref().map(|_| Instant::now());
        if let Some(claimed) = claimed {
            self.remove_own_record(&claimed)?;
        }
        debug!(record = ?self.held, "lock switch rolled back");
        Ok(true)
    }

    fn claim(&mut self, file: &Path, defer_release: bool) -> Result<Option<String>, LockError> {
        let record_path = lock_record_path(file)?;

        for _ in 0..2 {
            match self.create_record(&record_path) {
                Ok(()) => {
                    debug!(record = %record_path.display(), owner = %self.owner.display_name(), "lock record created");
                    self.mark_held(record_path, defer_release)?;
                    return Ok(None);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(LockError::Create {
                        path: record_path,
                        source,
                    })
                }
            }

            match self.inspect(&record_path)? {
                Holder::Own => {
                    self.write_record(&record_path)?;
                    self.mark_held(record_path, defer_release)?;
                    return Ok(None);
                }
                Holder::Live(holder) => {
                    debug!(record = %record_path.display(), %holder, "lock record held by another session");
                    return Ok(Some(holder));
                }
                Holder::Stale(holder) => {
                    warn!(record = %record_path.display(), %holder, "removing stale lock record");
                    remove_record(&record_path)?;
                    self.stale_owner = Some(holder);
                }
                Holder::Vanished => {}
            }
        }

        // Another process claimed the record between our removal and our retry.
        match self.inspect(&record_path)? {
            Holder::Own => {
                self.mark_held(record_path, defer_release)?;
                Ok(None)
            }
            Holder::Live(holder) | Holder::Stale(holder) => Ok(Some(holder)),
            Holder::Vanished => Ok(Some(UNKNOWN_HOLDER.to_owned())),
        }
    }

    /// Removes the held record. A record that was taken over by another session is left alone.
    pub fn release_lock(&mut self) -> Result<(), LockError> {
        self.commit_switch()?;
        let Some(record_path) = self.held.take() else {
            return Ok(());
        };
        self.refreshed_at = None;
        self.remove_own_record(&record_path)
    }

    fn remove_own_record(&self, record_path: &Path) -> Result<(), LockError> {
        match self.inspect(record_path)? {
            Holder::Own => {
                remove_record(record_path)?;
                debug!(record = %record_path.display(), "lock record released");
            }
            Holder::Vanished => {}
            Holder::Live(holder) | Holder::Stale(holder) => {
                info!(record = %record_path.display(), %holder, "lock record was taken over; leaving it in place");
            }
        }
        Ok(())
    }

    /// Rewrites the held record with a fresh timestamp.
    pub fn refresh(&mut self) -> Result<(), LockError> {
        let Some(record_path) = self.held.clone() else {
            return Ok(());
        };
        self.write_record(&record_path)?;
        self.refreshed_at = Some(Instant::now());
        Ok(())
    }

    /// Whether the held record was last written at least `interval` before `now`.
    pub fn refresh_due(&self, now: Instant, interval: Duration) -> bool {
        match (self.held.as_ref(), self.refreshed_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) >= interval,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns and clears the owner of the most recently removed stale record.
    pub fn pop_stale_lock_owner(&mut self) -> Option<String> {
        self.stale_owner.take()
    }

    /// Records `record_path` as held. A previously held record for another file is released, or
    /// parked as a pending switch when `defer_release` is set.
    fn mark_held(&mut self, record_path: PathBuf, defer_release: bool) -> Result<(), LockError> {
        self.refreshed_at = Some(Instant::now());
        if self.held.as_ref() == Some(&record_path) {
            return Ok(());
        }
        self.commit_switch()?;
        let previous = self.held.replace(record_path);
        if defer_release {
            self.switch = Some(PendingSwitch { previous });
            return Ok(());
        }
        match previous {
            Some(previous) => self.remove_own_record(&previous),
            None => Ok(()),
        }
    }

    fn record_bytes(&self) -> Vec<u8> {
        let record = LockRecord {
            owner: self.owner.clone(),
            created_at_ms: now_ms(),
        };
        // A record of plain strings and integers always serializes.
        serde_json::to_vec_pretty(&record).unwrap_or_default()
    }

    fn create_record(&self, record_path: &Path) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(record_path)?;
        if let Err(err) = file.write_all(&self.record_bytes()) {
            drop(file);
            let _ = fs::remove_file(record_path);
            return Err(err);
        }
        Ok(())
    }

    fn write_record(&self, record_path: &Path) -> Result<(), LockError> {
        fs::write(record_path, self.record_bytes()).map_err(|source| LockError::Create {
            path: record_path.to_path_buf(),
            source,
        })
    }

    fn inspect(&self, record_path: &Path) -> Result<Holder, LockError> {
        let contents = match fs::read(record_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Holder::Vanished),
            Err(source) => {
                return Err(LockError::Read {
                    path: record_path.to_path_buf(),
                    source,
                })
            }
        };

        match serde_json::from_slice::<LockRecord>(&contents) {
            Ok(record) => {
                let holder = record.owner.display_name();
                if record.owner.is_same_session(&self.owner) {
                    Ok(Holder::Own)
                } else if self.is_stale(&record) {
                    Ok(Holder::Stale(holder))
                } else {
                    Ok(Holder::Live(holder))
                }
            }
            Err(err) => {
                debug!(record = %record_path.display(), error = %err, "undecodable lock record");
                let modified = match fs::metadata(record_path).and_then(|md| md.modified()) {
                    Ok(modified) => modified,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        return Ok(Holder::Vanished)
                    }
                    Err(source) => {
                        return Err(LockError::Read {
                            path: record_path.to_path_buf(),
                            source,
                        })
                    }
                };
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default();
                if age > self.stale_after {
                    Ok(Holder::Stale(UNKNOWN_HOLDER.to_owned()))
                } else {
                    Ok(Holder::Live(UNKNOWN_HOLDER.to_owned()))
                }
            }
        }
    }

    fn is_stale(&self, record: &LockRecord) -> bool {
        if record.owner.host == self.owner.host {
            if let Some(alive) = pid_liveness(record.owner.pid) {
                return !alive;
            }
        }
        record.age() > self.stale_after
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        if let Err(err) = self.release_lock() {
            warn!(error = %err, "failed to release lock record on drop");
        }
    }
}

/// Path of the lock record guarding `file`.
pub fn lock_record_path(file: &Path) -> Result<PathBuf, LockError> {
    let Some(name) = file.file_name() else {
        return Err(LockError::InvalidPath {
            path: file.to_path_buf(),
        });
    };
    let record_name = format!(
        "{LOCK_FILE_PREFIX}{}{LOCK_FILE_SUFFIX}",
        name.to_string_lossy()
    );
    Ok(file.with_file_name(record_name))
}

fn remove_record(record_path: &Path) -> Result<(), LockError> {
    match fs::remove_file(record_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Remove {
            path: record_path.to_path_buf(),
            source,
        }),
    }
}

fn now_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| UNKNOWN_HOLDER.to_owned())
}

fn current_host() -> String {
    hostname::get()
        .map(|host| host.to_string_lossy().into_owned())
        .unwrap_or_else(|_| UNKNOWN_HOLDER.to_owned())
}

#[cfg(target_os = "linux")]
fn pid_liveness(pid: u32) -> Option<bool> {
    Some(Path::new(&format!("/proc/{pid}")).exists())
}

#[cfg(not(target_os = "linux"))]
fn pid_liveness(_pid: u32) -> Option<bool> {
    None
}
