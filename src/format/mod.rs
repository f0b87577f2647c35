// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Map serialization.
//!
//! The store consumes maps only through [`TreeParser`], [`TreeWriter`] and [`LegacyUpgrader`].
//! [`MapXmlFormat`] and [`VersionUpgrader`] are the implementations used by default.

use std::io::{self, Read, Write};

use quick_xml::events::attributes::AttrError;

use crate::model::MapNode;

pub mod map_xml;
pub mod upgrade;

pub use map_xml::MapXmlFormat;
pub use upgrade::VersionUpgrader;

/// Version written into the root `<map>` tag of every saved map.
pub const CURRENT_FORMAT_VERSION: &str = "0.9.0";

/// File extension of saved maps, without the dot.
pub const MAP_FILE_EXTENSION: &str = "mm";

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed xml at byte {offset}: {source}")]
    Xml {
        offset: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed attribute at byte {offset}: {source}")]
    Attribute {
        offset: usize,
        #[source]
        source: AttrError,
    },
    #[error("cannot write xml: {0}")]
    XmlWrite(#[from] quick_xml::Error),
    #[error("expected a <map> root element")]
    MissingMapRoot,
    #[error("map has no root node")]
    MissingRootNode,
    #[error("map has more than one root node (second one at byte {offset})")]
    MultipleRootNodes { offset: usize },
    #[error("unexpected <{name}> element after the map at byte {offset}")]
    TrailingElement { offset: usize, name: String },
    #[error("unclosed <{tag}> element")]
    Unclosed { tag: String },
}

/// Builds a map tree from a byte stream positioned at the start of the document.
pub trait TreeParser {
    fn parse(&self, input: &mut dyn Read) -> Result<MapNode, FormatError>;
}

/// Serializes a map tree as a complete document.
pub trait TreeWriter {
    fn write(&self, root: &MapNode, out: &mut dyn Write) -> Result<(), FormatError>;
}

/// Rewrites a document of an unrecognized format generation into the current one.
pub trait LegacyUpgrader {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>, FormatError>;
}
