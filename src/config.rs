// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Store configuration.
//!
//! Configuration is read from an optional JSON file; every field has a default so an empty
//! object (or no file at all) is a valid configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::backup::{
    BackupPolicy, DEFAULT_BACKUP_COUNT, DEFAULT_BACKUP_DIR, DEFAULT_BACKUP_EXTENSION,
};
use crate::store::lock::DEFAULT_STALE_LOCK_AFTER;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDurability {
    /// Fast, best-effort persistence.
    ///
    /// Written map contents are left to the OS page cache.
    #[default]
    BestEffort,

    /// Slower, best-effort durability.
    ///
    /// Flushes written map contents to stable storage before a save reports success. Exact
    /// guarantees are platform/filesystem-dependent.
    Durable,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Number of numbered backups kept per map. `0` disables backups.
    pub backup_count: u32,
    pub backup_dir: String,
    pub backup_extension: String,
    pub stale_lock_after_secs: u64,
    pub lock_refresh_secs: u64,
    /// `0` disables automatic saving.
    pub autosave_interval_secs: u64,
    pub autosave_count: u32,
    /// Directory for automatic saves. Automatic saving is off while unset.
    pub autosave_dir: Option<PathBuf>,
    pub durability: WriteDurability,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_count: DEFAULT_BACKUP_COUNT,
            backup_dir: DEFAULT_BACKUP_DIR.to_owned(),
            backup_extension: DEFAULT_BACKUP_EXTENSION.to_owned(),
            stale_lock_after_secs: DEFAULT_STALE_LOCK_AFTER.as_secs(),
            lock_refresh_secs: 4 * 60,
            autosave_interval_secs: 60,
            autosave_count: 5,
            autosave_dir: None,
            durability: WriteDurability::default(),
        }
    }
}

impl StoreConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn backup_policy(&self) -> BackupPolicy {
        BackupPolicy {
            count: self.backup_count,
            dir_name: self.backup_dir.clone(),
            extension: self.backup_extension.clone(),
        }
    }

    pub fn stale_lock_after(&self) -> Duration {
        Duration::from_secs(self.stale_lock_after_secs)
    }

    pub fn lock_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.lock_refresh_secs)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{ConfigError, StoreConfig, WriteDurability};

    #[test]
    fn empty_object_yields_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.backup_policy().dir_name, ".backup");
        assert_eq!(config.backup_policy().extension, "bak");
    }

    #[test]
    fn load_reads_partial_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mapkeep.json");
        fs::write(
            &path,
            r#"{ "backup_count": 7, "durability": "durable", "autosave_dir": "/tmp/auto" }"#,
        )
        .unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.backup_count, 7);
        assert_eq!(config.durability, WriteDurability::Durable);
        assert_eq!(config.autosave_dir.as_deref(), Some(std::path::Path::new("/tmp/auto")));
        assert_eq!(config.backup_extension, "bak");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mapkeep.json");
        fs::write(&path, r#"{ "backups": 3 }"#).unwrap();

        assert!(matches!(StoreConfig::load(&path), Err(ConfigError::Json { .. })));
    }
}
