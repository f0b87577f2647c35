// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Loading and saving of map documents.
//!
//! The [`FileManager`] ties the pieces of the store together: advisory lock records, OS-level
//! file locks, the backup series, version sniffing and the pluggable map format. User-facing
//! outcomes go through a [`Frontend`]; only a missing file on load propagates as an error.
//!
//! Loading walks `lock check -> version check -> parse`. Every failure after the existence
//! check degrades into a placeholder document that is still bound to the path.
//!
//! Saving claims the advisory lock, moves the previous file into the backup series once per
//! session, then writes under an exclusive non-blocking OS lock.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{StoreConfig, WriteDurability};
use crate::format::{
    FormatError, LegacyUpgrader, MapXmlFormat, TreeParser, TreeWriter, VersionUpgrader,
    MAP_FILE_EXTENSION,
};
use crate::model::MapNode;
use crate::store::backup::{self, BackupOutcome};
use crate::store::document::{AutoSaveTimer, Document};
use crate::store::error::{StoreError, StoreErrorKind};
use crate::store::frontend::{file_label, Frontend, Notice};
use crate::store::lock::{LockError, LockManager};
use crate::store::os_lock::LockedFile;
use crate::store::version::{self, VersionClass};

/// Root text prefix of the placeholder document produced when a map cannot be read.
pub const PARSE_FAILURE_PREFIX: &str = "Error while parsing file:";

const UNSAFE_FILE_NAME_CHARS: &[char] = &['&', ':', '/', '\\', '\0', '%', '$', '#', '~', '?', '*'];
const UNNAMED_AUTOSAVE_STEM: &str = "unnamed";

/// Result of [`FileManager::load`].
#[derive(Debug)]
pub enum LoadedMap {
    Intact(Document),
    /// The file exists but could not be read; the document holds a placeholder root.
    Degraded { document: Document, message: String },
}

impl LoadedMap {
    pub fn document(&self) -> &Document {
        match self {
            Self::Intact(document) | Self::Degraded { document, .. } => document,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            Self::Intact(document) | Self::Degraded { document, .. } => document,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

pub struct FileManager {
    config: StoreConfig,
    parser: Box<dyn TreeParser>,
    writer: Box<dyn TreeWriter>,
    upgrader: Box<dyn LegacyUpgrader>,
    convert_without_asking: bool,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl FileManager {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            parser: Box::new(MapXmlFormat),
            writer: Box::new(MapXmlFormat),
            upgrader: Box::new(VersionUpgrader),
            convert_without_asking: false,
        }
    }

    pub fn with_parser(mut self, parser: impl TreeParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_writer(mut self, writer: impl TreeWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn with_upgrader(mut self, upgrader: impl LegacyUpgrader + 'static) -> Self {
        self.upgrader = Box::new(upgrader);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether a "don't ask again" answer enabled silent conversion of unknown versions.
    pub fn converts_without_asking(&self) -> bool {
        self.convert_without_asking
    }

    /// A new unsaved document with its own lock session and auto-save timer.
    pub fn new_document(&self, root: MapNode) -> Document {
        Document::with_session(
            root,
            LockManager::new(self.config.stale_lock_after()),
            AutoSaveTimer::new(self.config.autosave_interval()),
        )
    }

    pub fn load(
        &mut self,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> Result<LoadedMap, StoreError> {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            _ => {}
        }

        let mut document = self.new_document(MapNode::default());
        self.lock_for_editing(&mut document, path, frontend);

        let failure = match self.read_tree(path, frontend) {
            Ok(root) => {
                document.set_root(root);
                None
            }
            Err(err) => {
                let message = format!("{PARSE_FAILURE_PREFIX}{}", path.display());
                error!(path = %path.display(), error = %err, "cannot load map; using placeholder");
                frontend.error(&Notice::ParseFailed {
                    message: message.clone(),
                });
                document.set_root(MapNode::new(message.clone()));
                Some(message)
            }
        };

        document.bind(path.to_path_buf());
        document.set_saved(true);
        document.autosave.schedule(Instant::now());
        info!(
            path = %path.display(),
            read_only = document.is_read_only(),
            degraded = failure.is_some(),
            "map loaded"
        );

        Ok(match failure {
            None => LoadedMap::Intact(document),
            Some(message) => LoadedMap::Degraded { document, message },
        })
    }

    /// Claims the advisory lock of `path` for `document`.
    ///
    /// A removed stale record is reported through `frontend` once. On success the document is
    /// no longer read-only.
    pub fn try_lock(
        &self,
        document: &mut Document,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> Result<Option<String>, LockError> {
        self.claim_lock(document, path, false, frontend)
    }

    fn claim_lock(
        &self,
        document: &mut Document,
        path: &Path,
        defer_release: bool,
        frontend: &mut dyn Frontend,
    ) -> Result<Option<String>, LockError> {
        let holder = if defer_release {
            document.lock.begin_switch(path)?
        } else {
            document.lock.try_lock(path)?
        };
        if let Some(stale) = document.lock.pop_stale_lock_owner() {
            info!(path = %path.display(), holder = %stale, "removed stale lock record");
            frontend.inform(&Notice::StaleLockRemoved {
                file: file_label(path),
                holder: stale,
            });
        }
        if holder.is_none() {
            document.set_read_only(false);
        }
        Ok(holder)
    }

    /// Saves a modified document to its file, asking for a location when it has none or is
    /// read-only.
    pub fn save(&self, document: &mut Document, frontend: &mut dyn Frontend) -> bool {
        if document.is_saved() {
            return true;
        }
        match document.path() {
            Some(path) if !document.is_read_only() => {
                let path = path.to_path_buf();
                self.save_to(document, &path, frontend)
            }
            _ => self.save_as_chosen(document, frontend),
        }
    }

    /// Saves `document` to `path`. A new location starts a new backup session.
    pub fn save_as(
        &self,
        document: &mut Document,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> bool {
        let same_target = document
            .path()
            .is_some_and(|current| absolute_path(current) == absolute_path(path));
        if !same_target {
            document.set_backed_up(false);
        }
        self.save_to(document, path, frontend)
    }

    /// Explicit save to `path`: advisory lock, one-shot backup, then the write.
    pub fn save_to(
        &self,
        document: &mut Document,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> bool {
        let previous = document.path().map(Path::to_path_buf);
        let was_read_only = document.is_read_only();

        let outcome = match self.claim_for_save(document, path, frontend) {
            Ok(()) => {
                self.backup_once(document, path, frontend);
                let written = self.write_document(document, path, false);
                settle_lock_switch(document, written.is_ok(), was_read_only);
                written
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                frontend.map_url_changed(previous.as_deref(), path);
                info!(path = %path.display(), "map saved");
                true
            }
            Err(err) => {
                self.report_save_failure(&err, path, false, frontend);
                false
            }
        }
    }

    /// Writes `document` to `path` without touching the advisory lock or the backup series.
    ///
    /// Internal saves (automatic saves) leave the document's path and saved flag alone and
    /// report failures on the status line only.
    pub fn save_internal(
        &self,
        document: &mut Document,
        path: &Path,
        internal: bool,
        frontend: &mut dyn Frontend,
    ) -> bool {
        match self.write_document(document, path, internal) {
            Ok(()) => true,
            Err(err) => {
                self.report_save_failure(&err, path, internal, frontend);
                false
            }
        }
    }

    /// Writes a modified document into the next auto-save slot.
    pub fn auto_save(
        &self,
        document: &mut Document,
        frontend: &mut dyn Frontend,
    ) -> Option<PathBuf> {
        let Some(dir) = self.config.autosave_dir.as_deref() else {
            document.autosave.schedule(Instant::now());
            return None;
        };
        if document.is_saved() {
            document.autosave.schedule(Instant::now());
            return None;
        }

        let target = match self.next_autosave_slot(dir, document.path()) {
            Ok(target) => target,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "cannot prepare auto-save slot");
                frontend.status(&Notice::SaveFailed {
                    file: file_label(dir),
                });
                document.autosave.schedule(Instant::now());
                return None;
            }
        };

        if self.save_internal(document, &target, true, frontend) {
            debug!(path = %target.display(), "auto-saved map");
            Some(target)
        } else {
            None
        }
    }

    /// Runs periodic work for `document`: a due auto-save and a due lock refresh.
    pub fn tick(&self, document: &mut Document, now: Instant, frontend: &mut dyn Frontend) {
        if document.autosave().is_due(now) {
            self.auto_save(document, frontend);
        }
        if document
            .lock()
            .refresh_due(now, self.config.lock_refresh_interval())
        {
            if let Err(err) = document.lock.refresh() {
                warn!(error = %err, "cannot refresh lock record");
            }
        }
    }

    /// Replaces `document` with a fresh load of its file.
    ///
    /// Returns `Ok(false)` when the document has no file to revert to.
    pub fn revert(
        &mut self,
        document: &mut Document,
        frontend: &mut dyn Frontend,
    ) -> Result<bool, StoreError> {
        let Some(path) = document.path().map(Path::to_path_buf) else {
            return Ok(false);
        };
        if !path.is_file() {
            return Err(StoreError::NotFound { path });
        }
        if let Err(err) = document.lock.release_lock() {
            warn!(path = %path.display(), error = %err, "cannot release lock before revert");
        }
        *document = self.load(&path, frontend)?.into_document();
        Ok(true)
    }

    /// Releases the document's advisory lock.
    pub fn close(&self, mut document: Document) -> Result<(), LockError> {
        document.lock.release_lock()
    }

    fn lock_for_editing(&self, document: &mut Document, path: &Path, frontend: &mut dyn Frontend) {
        if !is_writable(path) {
            debug!(path = %path.display(), "map is not writable; opening read-only");
            document.set_read_only(true);
            return;
        }
        match self.try_lock(document, path, frontend) {
            Ok(None) => {}
            Ok(Some(holder)) => {
                info!(path = %path.display(), %holder, "map is locked; opening read-only");
                frontend.inform(&Notice::LockedOnOpen {
                    file: file_label(path),
                    holder,
                });
                document.set_read_only(true);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "locking failed; opening read-only");
                frontend.inform(&Notice::LockingFailedOnOpen {
                    file: file_label(path),
                });
                document.set_read_only(true);
            }
        }
    }

    fn read_tree(
        &mut self,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> Result<MapNode, StoreError> {
        let file = File::open(path).map_err(read_error(path))?;
        let locked = LockedFile::shared(file).map_err(read_error(path))?;
        let sniffed = version::sniff(BufReader::new(locked)).map_err(read_error(path))?;
        let class = sniffed.class();
        let mut input: Box<dyn Read> = Box::new(sniffed.into_reader());

        match class {
            VersionClass::Current => {}
            VersionClass::Legacy(found) => {
                debug!(path = %path.display(), version = found, "reading legacy map");
            }
            VersionClass::Unknown => {
                if self.should_convert(path, frontend) {
                    debug!(path = %path.display(), "converting map of unknown version");
                    input = self.upgrader.transform(input).map_err(parse_error(path))?;
                }
            }
        }

        self.parser.parse(&mut input).map_err(parse_error(path))
    }

    fn should_convert(&mut self, path: &Path, frontend: &mut dyn Frontend) -> bool {
        if self.convert_without_asking {
            return true;
        }
        let answer = frontend.confirm_conversion(path);
        if answer.accepted && answer.dont_ask_again {
            self.convert_without_asking = true;
        }
        answer.accepted
    }

    fn save_as_chosen(&self, document: &mut Document, frontend: &mut dyn Frontend) -> bool {
        let proposal = file_name_proposal(document.root());
        let Some(chosen) = frontend.choose_save_path(&proposal) else {
            debug!("save-as cancelled");
            return false;
        };
        let target = with_map_extension(chosen);
        if target.exists() && !frontend.confirm_overwrite(&target) {
            debug!(path = %target.display(), "overwrite declined");
            return false;
        }
        self.save_as(document, &target, frontend)
    }

    fn claim_for_save(
        &self,
        document: &mut Document,
        path: &Path,
        frontend: &mut dyn Frontend,
    ) -> Result<(), StoreError> {
        match self.claim_lock(document, path, true, frontend) {
            Ok(None) => Ok(()),
            Ok(Some(holder)) => Err(StoreError::LockContention {
                path: path.to_path_buf(),
                holder,
            }),
            Err(source) => Err(StoreError::LockIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn backup_once(&self, document: &mut Document, path: &Path, frontend: &mut dyn Frontend) {
        if document.is_backed_up() {
            return;
        }
        document.set_backed_up(true);

        match backup::backup_file(path, &self.config.backup_policy()) {
            BackupOutcome::BackedUp(destination) => {
                info!(path = %path.display(), backup = %destination.display(), "previous version backed up");
            }
            BackupOutcome::Disabled | BackupOutcome::NothingToBackUp => {}
            BackupOutcome::DirUnavailable(_)
            | BackupOutcome::RotationFailed(_)
            | BackupOutcome::SlotOccupied(_)
            | BackupOutcome::MoveFailed(_) => frontend.status(&Notice::BackupSkipped {
                file: file_label(path),
            }),
        }
    }

    fn write_document(
        &self,
        document: &mut Document,
        path: &Path,
        internal: bool,
    ) -> Result<(), StoreError> {
        if !internal && document.is_read_only() {
            return Err(StoreError::ReadOnly {
                path: path.to_path_buf(),
            });
        }

        document.autosave.cancel();
        let result = self.write_tree(document.root(), path);
        if result.is_ok() && !internal {
            document.bind(path.to_path_buf());
            document.set_saved(true);
        }
        document.autosave.schedule(Instant::now());
        result
    }

    fn write_tree(&self, root: &MapNode, path: &Path) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(write_error(path))?;
        let Some(mut locked) = LockedFile::try_exclusive(file).map_err(write_error(path))? else {
            return Err(StoreError::FileBusy {
                path: path.to_path_buf(),
            });
        };
        // Truncate only once the exclusive lock is held.
        locked.file().set_len(0).map_err(write_error(path))?;

        let mut out = BufWriter::new(&mut locked);
        self.writer
            .write(root, &mut out)
            .map_err(|source| StoreError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        out.flush().map_err(write_error(path))?;
        drop(out);

        if self.config.durability == WriteDurability::Durable {
            locked.file().sync_all().map_err(write_error(path))?;
        }
        debug!(path = %path.display(), durability = ?self.config.durability, "map written");
        Ok(())
    }

    fn report_save_failure(
        &self,
        err: &StoreError,
        path: &Path,
        internal: bool,
        frontend: &mut dyn Frontend,
    ) {
        let file = file_label(path);
        match err.kind() {
            StoreErrorKind::LockContention => {
                info!(path = %path.display(), error = %err, "save blocked by lock");
                frontend.inform(&Notice::LockedOnSave {
                    file,
                    holder: err.holder().unwrap_or("unknown").to_owned(),
                });
            }
            StoreErrorKind::LockIo => {
                warn!(path = %path.display(), error = %err, "save aborted; locking failed");
                frontend.inform(&Notice::LockingFailedOnSave { file });
            }
            // Saves only produce write errors; the other kinds come from loading.
            StoreErrorKind::NotFound | StoreErrorKind::Parse | StoreErrorKind::Write => {
                debug_assert_eq!(err.kind(), StoreErrorKind::Write, "unexpected save error: {err}");
                error!(path = %path.display(), internal, error = %err, "save failed");
                let notice = Notice::SaveFailed { file };
                if internal {
                    frontend.status(&notice);
                } else {
                    frontend.error(&notice);
                }
            }
        }
    }

    fn next_autosave_slot(&self, dir: &Path, map_path: Option<&Path>) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let stem = map_path
            .and_then(Path::file_stem)
            .map_or_else(
                || UNNAMED_AUTOSAVE_STEM.to_owned(),
                |stem| stem.to_string_lossy().into_owned(),
            );
        let name = format!("{stem}.autosave");
        let count = self.config.autosave_count.max(1);
        backup::rotate_backups(dir, &name, count, MAP_FILE_EXTENSION)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "auto-save rotation is disabled"))
    }
}

/// Keeps the lock on the new target after a successful write. After a failed one the previous
/// record is held again and the read-only flag restored.
fn settle_lock_switch(document: &mut Document, written: bool, was_read_only: bool) {
    if written {
        if let Err(err) = document.lock.commit_switch() {
            warn!(error = %err, "failed to release previous lock record");
        }
        return;
    }
    match document.lock.rollback_switch() {
        Ok(true) => document.set_read_only(was_read_only),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "failed to give up lock record of failed save"),
    }
}

/// Suggested file name for a map: the root's plain text without characters that are unsafe in
/// file names.
pub fn file_name_proposal(root: &MapNode) -> String {
    root.plain_text()
        .chars()
        .filter(|ch| !UNSAFE_FILE_NAME_CHARS.contains(ch))
        .collect()
}

/// Appends the map extension unless `path` already carries it.
pub(crate) fn with_map_extension(path: PathBuf) -> PathBuf {
    if path
        .extension()
        .is_some_and(|extension| extension == MAP_FILE_EXTENSION)
    {
        return path;
    }
    let mut name = path.into_os_string();
    name.push(".");
    name.push(MAP_FILE_EXTENSION);
    PathBuf::from(name)
}

fn is_writable(path: &Path) -> bool {
    OpenOptions::new().append(true).open(path).is_ok()
}

fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn read_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn write_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_error(path: &Path) -> impl FnOnce(FormatError) -> StoreError + '_ {
    move |source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    }
}
