// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Mapkeep: persistence and locking for mind-map files.
//!
//! The crate is a single-crate layout: [`model`] holds the in-memory tree, [`format`] the map
//! file format, [`store`] locking, backups and the load/save orchestration, and [`config`] the
//! settings that tune them.

pub mod config;
pub mod format;
pub mod model;
pub mod store;
