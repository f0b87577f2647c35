// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Numbered backup series for map files.
//!
//! Backups live in a sibling directory (`.backup` by default) and are named
//! `<name>.<index>.<extension>`. Index 1 is the oldest entry; once the series is full the newest
//! backup always lands at index `count`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const DEFAULT_BACKUP_DIR: &str = ".backup";
pub const DEFAULT_BACKUP_EXTENSION: &str = "bak";
pub const DEFAULT_BACKUP_COUNT: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Number of backups to retain. `0` disables backups.
    pub count: u32,
    /// Backup directory, relative to the map file's directory.
    pub dir_name: String,
    pub extension: String,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            count: DEFAULT_BACKUP_COUNT,
            dir_name: DEFAULT_BACKUP_DIR.to_owned(),
            extension: DEFAULT_BACKUP_EXTENSION.to_owned(),
        }
    }
}

/// What [`backup_file`] did. None of these outcomes is an error for the caller; a failed backup
/// never blocks saving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Disabled,
    /// The map file does not exist yet.
    NothingToBackUp,
    DirUnavailable(PathBuf),
    /// Shifting the series failed; the map file was left in place.
    RotationFailed(PathBuf),
    /// The destination slot already had content; the map file was left in place.
    SlotOccupied(PathBuf),
    MoveFailed(PathBuf),
    BackedUp(PathBuf),
}

pub fn backup_file_name(backup_dir: &Path, name: &str, index: u32, extension: &str) -> PathBuf {
    backup_dir.join(format!("{name}.{index}.{extension}"))
}

/// Makes room in the backup series and returns the slot the next backup goes to.
///
/// Slots above `count` are deleted, walking upward until the first free one. If the series is
/// not full yet the slot after the highest populated one is returned. Otherwise index 1 is
/// evicted, every other entry moves down by one index and slot `count` is returned. A rename
/// failure while shifting aborts the rotation; gaps in the series are skipped.
pub fn rotate_backups(
    backup_dir: &Path,
    name: &str,
    count: u32,
    extension: &str,
) -> io::Result<Option<PathBuf>> {
    if count == 0 {
        return Ok(None);
    }

    let mut index = count + 1;
    loop {
        let stale = backup_file_name(backup_dir, name, index, extension);
        if !stale.exists() {
            break;
        }
        if let Err(err) = fs::remove_file(&stale) {
            warn!(path = %stale.display(), error = %err, "cannot remove surplus backup");
        }
        index += 1;
    }

    let highest = (1..=count)
        .rev()
        .find(|&index| backup_file_name(backup_dir, name, index, extension).exists())
        .unwrap_or(0);

    if highest < count {
        return Ok(Some(backup_file_name(
            backup_dir,
            name,
            highest + 1,
            extension,
        )));
    }

    match fs::remove_file(backup_file_name(backup_dir, name, 1, extension)) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    // Each target is free here: index 1 was just evicted, later ones were moved down already.
    for index in 1..count {
        let target = backup_file_name(backup_dir, name, index, extension);
        let source = backup_file_name(backup_dir, name, index + 1, extension);
        if !source.exists() {
            continue;
        }
        fs::rename(&source, &target)?;
    }

    Ok(Some(backup_file_name(backup_dir, name, count, extension)))
}

/// Moves `file` into its backup series.
pub fn backup_file(file: &Path, policy: &BackupPolicy) -> BackupOutcome {
    if policy.count == 0 {
        return BackupOutcome::Disabled;
    }
    if !file.is_file() {
        return BackupOutcome::NothingToBackUp;
    }

    let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
        return BackupOutcome::NothingToBackUp;
    };
    let name = name.to_string_lossy();
    let backup_dir = parent.join(&policy.dir_name);

    if let Err(err) = fs::create_dir_all(&backup_dir) {
        warn!(dir = %backup_dir.display(), error = %err, "cannot create backup directory");
        return BackupOutcome::DirUnavailable(backup_dir);
    }

    match rotate_backups(&backup_dir, &name, policy.count, &policy.extension) {
        Ok(Some(destination)) => commit_backup(file, destination),
        Ok(None) => BackupOutcome::Disabled,
        Err(err) => {
            warn!(dir = %backup_dir.display(), error = %err, "backup rotation failed");
            BackupOutcome::RotationFailed(backup_dir)
        }
    }
}

/// Moves `file` to `destination` unless the destination already exists.
pub(crate) fn commit_backup(file: &Path, destination: PathBuf) -> BackupOutcome {
    if destination.exists() {
        warn!(slot = %destination.display(), "backup slot already occupied; keeping original in place");
        return BackupOutcome::SlotOccupied(destination);
    }
    match fs::rename(file, &destination) {
        Ok(()) => {
            debug!(from = %file.display(), to = %destination.display(), "backup created");
            BackupOutcome::BackedUp(destination)
        }
        Err(err) => {
            warn!(from = %file.display(), to = %destination.display(), error = %err, "cannot move file into backup slot");
            BackupOutcome::MoveFailed(destination)
        }
    }
}
