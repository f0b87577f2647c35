// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The narrow user-facing surface the store talks to.
//!
//! The store never renders anything itself. It hands [`Notice`]s to a [`Frontend`] and asks it
//! the few questions that need a human answer.

use std::fmt;
use std::path::{Path, PathBuf};

/// Something the user should learn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LockedOnOpen { file: String, holder: String },
    LockingFailedOnOpen { file: String },
    LockedOnSave { file: String, holder: String },
    LockingFailedOnSave { file: String },
    StaleLockRemoved { file: String, holder: String },
    /// The map could not be read; `message` is also the placeholder root text.
    ParseFailed { message: String },
    SaveFailed { file: String },
    BackupSkipped { file: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockedOnOpen { file, holder } => write!(
                f,
                "The map {file} is already being edited by {holder}. It was opened read-only."
            ),
            Self::LockingFailedOnOpen { file } => write!(
                f,
                "The map {file} could not be locked. It was opened read-only."
            ),
            Self::LockedOnSave { file, holder } => write!(
                f,
                "The map {file} is being edited by {holder}. It was not saved."
            ),
            Self::LockingFailedOnSave { file } => write!(
                f,
                "The map {file} could not be locked for saving. It was not saved."
            ),
            Self::StaleLockRemoved { file, holder } => write!(
                f,
                "Removed an old lock on {file} left behind by {holder}."
            ),
            Self::ParseFailed { message } => f.write_str(message),
            Self::SaveFailed { file } => write!(f, "Could not save file {file}"),
            Self::BackupSkipped { file } => write!(f, "No backup was made of {file}"),
        }
    }
}

/// Answer to a yes/no question that offers "don't ask again".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub accepted: bool,
    pub dont_ask_again: bool,
}

impl Confirmation {
    pub const fn accept() -> Self {
        Self {
            accepted: true,
            dont_ask_again: false,
        }
    }

    pub const fn accept_always() -> Self {
        Self {
            accepted: true,
            dont_ask_again: true,
        }
    }

    pub const fn decline() -> Self {
        Self {
            accepted: false,
            dont_ask_again: false,
        }
    }
}

pub trait Frontend {
    /// Modal information message.
    fn inform(&mut self, notice: &Notice);

    /// Modal error message.
    fn error(&mut self, notice: &Notice);

    /// Passive status line message.
    fn status(&mut self, notice: &Notice);

    /// Asks whether a map of unknown format version should be converted before parsing.
    fn confirm_conversion(&mut self, path: &Path) -> Confirmation;

    /// Asks for a target path for a map that has none (or is read-only). `proposal` is a
    /// suggested file name without extension.
    fn choose_save_path(&mut self, _proposal: &str) -> Option<PathBuf> {
        None
    }

    fn confirm_overwrite(&mut self, _path: &Path) -> bool {
        false
    }

    /// The document was saved under a new location.
    fn map_url_changed(&mut self, _old: Option<&Path>, _new: &Path) {}
}

/// Display name of a map file for notices.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}
