// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! In-memory map documents and their per-session persistence state.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::model::MapNode;
use crate::store::lock::LockManager;

/// Deadline for the next automatic save of a document.
///
/// A zero interval disables the timer; scheduling is still counted so callers can tell that a
/// save attempt finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveTimer {
    interval: Duration,
    due_at: Option<Instant>,
    schedules: u64,
}

impl AutoSaveTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            due_at: None,
            schedules: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel(&mut self) {
        self.due_at = None;
    }

    pub fn schedule(&mut self, now: Instant) {
        self.schedules += 1;
        self.due_at = if self.interval.is_zero() {
            None
        } else {
            now.checked_add(self.interval)
        };
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at.is_some_and(|due_at| now >= due_at)
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.due_at
    }

    /// How many times the timer was (re)scheduled.
    pub fn schedule_count(&self) -> u64 {
        self.schedules
    }
}

/// An open map plus everything the store tracks about it.
///
/// Each document owns exactly one lock session. Dropping the document releases its lock record.
#[derive(Debug)]
pub struct Document {
    root: MapNode,
    path: Option<PathBuf>,
    saved: bool,
    read_only: bool,
    backed_up: bool,
    pub(crate) lock: LockManager,
    pub(crate) autosave: AutoSaveTimer,
}

impl Document {
    /// A fresh, unsaved document without a backing file.
    pub fn new(root: MapNode) -> Self {
        Self::with_session(root, LockManager::default(), AutoSaveTimer::disabled())
    }

    pub(crate) fn with_session(root: MapNode, lock: LockManager, autosave: AutoSaveTimer) -> Self {
        Self {
            root,
            path: None,
            saved: false,
            read_only: false,
            backed_up: false,
            lock,
            autosave,
        }
    }

    pub fn root(&self) -> &MapNode {
        &self.root
    }

    /// Mutable access to the tree; the document counts as modified afterwards.
    pub fn root_mut(&mut self) -> &mut MapNode {
        self.saved = false;
        &mut self.root
    }

    pub fn set_root(&mut self, root: MapNode) {
        self.root = root;
        self.saved = false;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn mark_modified(&mut self) {
        self.saved = false;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the backing file was already moved into the backup series this session.
    pub fn is_backed_up(&self) -> bool {
        self.backed_up
    }

    pub fn lock(&self) -> &LockManager {
        &self.lock
    }

    pub fn autosave(&self) -> &AutoSaveTimer {
        &self.autosave
    }

    pub(crate) fn bind(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub(crate) fn set_saved(&mut self, saved: bool) {
        self.saved = saved;
    }

    pub(crate) fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub(crate) fn set_backed_up(&mut self, backed_up: bool) {
        self.backed_up = backed_up;
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{AutoSaveTimer, Document};
    use crate::model::MapNode;

    #[test]
    fn timer_schedules_relative_to_now() {
        let mut timer = AutoSaveTimer::new(Duration::from_secs(60));
        let now = Instant::now();
        timer.schedule(now);

        assert!(timer.is_pending());
        assert!(!timer.is_due(now));
        assert!(timer.is_due(now + Duration::from_secs(60)));
        assert_eq!(timer.schedule_count(), 1);

        timer.cancel();
        assert!(!timer.is_pending());
        assert!(!timer.is_due(now + Duration::from_secs(600)));
    }

    #[test]
    fn disabled_timer_never_fires() {
        let mut timer = AutoSaveTimer::disabled();
        let now = Instant::now();
        timer.schedule(now);
        assert!(!timer.is_pending());
        assert!(!timer.is_due(now + Duration::from_secs(3600)));
        assert_eq!(timer.schedule_count(), 1);
    }

    #[test]
    fn editing_the_tree_marks_document_modified() {
        let mut document = Document::new(MapNode::new("root"));
        document.set_saved(true);

        document.root_mut().set_text("renamed");

        assert!(!document.is_saved());
        assert_eq!(document.root().text(), "renamed");
        assert!(document.path().is_none());
    }
}
