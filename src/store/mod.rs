// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for map documents on disk.
//!
//! The store module owns everything between an in-memory map and its file: advisory lock
//! records, OS file locks, the numbered backup series, version sniffing and the load/save
//! orchestration in [`FileManager`].

pub mod backup;
pub mod document;
pub mod error;
pub mod file_manager;
pub mod frontend;
pub mod lock;
pub mod os_lock;
pub mod version;

pub use backup::{backup_file, rotate_backups, BackupOutcome, BackupPolicy};
pub use document::{AutoSaveTimer, Document};
pub use error::{StoreError, StoreErrorKind};
pub use file_manager::{file_name_proposal, FileManager, LoadedMap, PARSE_FAILURE_PREFIX};
pub use frontend::{Confirmation, Frontend, Notice};
pub use lock::{lock_record_path, LockError, LockManager, LockOwner, LockRecord};
pub use os_lock::LockedFile;
pub use version::{sniff, VersionClass};
