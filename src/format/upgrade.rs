// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::io::{BufReader, Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use super::{FormatError, LegacyUpgrader, CURRENT_FORMAT_VERSION};

/// Upgrades maps of unknown format generations by stamping the current version onto the root
/// `<map>` tag.
///
/// Elements the current parser does not understand are already tolerated, so rewriting the
/// version is all an upgrade needs for the supported element set.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionUpgrader;

impl LegacyUpgrader for VersionUpgrader {
    fn transform<'a>(&self, input: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>, FormatError> {
        let mut reader = Reader::from_reader(BufReader::new(input));
        let mut writer = Writer::new(Vec::new());
        let mut buf = Vec::new();
        let mut stamped = false;

        loop {
            let offset = reader.buffer_position();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| FormatError::Xml { offset, source })?;
            match event {
                Event::Eof => break,
                Event::Start(tag) if !stamped && tag.name().as_ref() == b"map" => {
                    writer.write_event(Event::Start(restamp(&tag, offset)?))?;
                    stamped = true;
                }
                Event::Empty(tag) if !stamped && tag.name().as_ref() == b"map" => {
                    writer.write_event(Event::Empty(restamp(&tag, offset)?))?;
                    stamped = true;
                }
                other => writer.write_event(other)?,
            }
            buf.clear();
        }

        if !stamped {
            return Err(FormatError::MissingMapRoot);
        }
        Ok(Box::new(Cursor::new(writer.into_inner())))
    }
}

/// Copy of the map tag with `version` replaced by the current one and moved to the front, where
/// the sniffer looks for it.
fn restamp(tag: &BytesStart<'_>, offset: usize) -> Result<BytesStart<'static>, FormatError> {
    let mut out = BytesStart::new("map");
    out.push_attribute(("version", CURRENT_FORMAT_VERSION));

    let mut previous = None;
    for attr in tag.attributes() {
        let attr = attr.map_err(|source| FormatError::Attribute { offset, source })?;
        if attr.key.as_ref() == b"version" {
            previous = Some(String::from_utf8_lossy(&attr.value).into_owned());
        } else {
            out.push_attribute(attr);
        }
    }

    match previous {
        Some(from) => debug!(%from, to = CURRENT_FORMAT_VERSION, "upgrading map version"),
        None => debug!(to = CURRENT_FORMAT_VERSION, "stamping version onto unversioned map"),
    }
    Ok(out)
}
