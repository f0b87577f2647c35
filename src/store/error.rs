// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::io;
use std::path::PathBuf;

use crate::format::FormatError;
use crate::store::lock::LockError;

/// Coarse classification of [`StoreError`], used to decide how a failure reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    NotFound,
    LockContention,
    LockIo,
    Parse,
    Write,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("map file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("map {path:?} is locked by {holder}")]
    LockContention { path: PathBuf, holder: String },
    #[error("cannot lock map {path:?}: {source}")]
    LockIo {
        path: PathBuf,
        #[source]
        source: LockError,
    },
    #[error("cannot read map {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse map {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("map {path:?} is read-only")]
    ReadOnly { path: PathBuf },
    #[error("map {path:?} is locked by another process")]
    FileBusy { path: PathBuf },
    #[error("cannot write map {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot serialize map to {path:?}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::NotFound { .. } => StoreErrorKind::NotFound,
            Self::LockContention { .. } => StoreErrorKind::LockContention,
            Self::LockIo { .. } => StoreErrorKind::LockIo,
            Self::Read { .. } | Self::Parse { .. } => StoreErrorKind::Parse,
            Self::ReadOnly { .. }
            | Self::FileBusy { .. }
            | Self::Write { .. }
            | Self::Serialize { .. } => StoreErrorKind::Write,
        }
    }

    /// Holder named by a lock contention.
    pub fn holder(&self) -> Option<&str> {
        match self {
            Self::LockContention { holder, .. } => Some(holder),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use rstest::rstest;

    use super::{StoreError, StoreErrorKind};
    use crate::format::FormatError;

    fn path() -> PathBuf {
        PathBuf::from("plan.mm")
    }

    #[rstest]
    #[case(StoreError::NotFound { path: path() }, StoreErrorKind::NotFound)]
    #[case(
        StoreError::Read { path: path(), source: io::Error::from(io::ErrorKind::PermissionDenied) },
        StoreErrorKind::Parse
    )]
    #[case(
        StoreError::Parse { path: path(), source: FormatError::MissingMapRoot },
        StoreErrorKind::Parse
    )]
    #[case(StoreError::FileBusy { path: path() }, StoreErrorKind::Write)]
    #[case(StoreError::ReadOnly { path: path() }, StoreErrorKind::Write)]
    fn errors_fall_into_their_kind(#[case] error: StoreError, #[case] kind: StoreErrorKind) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.holder(), None);
    }

    #[test]
    fn contention_exposes_holder() {
        let error = StoreError::LockContention {
            path: path(),
            holder: "ada@lab".to_owned(),
        };
        assert_eq!(error.kind(), StoreErrorKind::LockContention);
        assert_eq!(error.holder(), Some("ada@lab"));
        assert!(error.to_string().contains("ada@lab"));
    }
}
