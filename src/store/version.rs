// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Format version detection for saved maps.
//!
//! Saved maps start with a root tag carrying the format version, e.g. `<map version="0.9.0"`.
//! The sniffer reads just enough bytes to compare against the known markers and hands back a
//! reader that replays those bytes, so parsing still starts at byte zero.

use std::io::{self, Chain, Cursor, Read};

use crate::format::CURRENT_FORMAT_VERSION;

/// Markers in match order: the current version first, then legacy versions that the parser
/// still reads without an upgrade.
const VERSION_MARKERS: &[(&str, &str)] = &[
    (CURRENT_FORMAT_VERSION, "<map version=\"0.9.0\""),
    ("0.8.0", "<map version=\"0.8.0\""),
    ("0.7.1", "<map version=\"0.7.1\""),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionClass {
    Current,
    Legacy(&'static str),
    Unknown,
}

impl VersionClass {
    /// Whether the stream can go to the parser without asking about an upgrade.
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Length of the longest known marker; the number of bytes [`sniff`] reads.
pub fn marker_len() -> usize {
    VERSION_MARKERS
        .iter()
        .map(|(_, marker)| marker.len())
        .max()
        .unwrap_or(0)
}

pub fn classify(prefix: &[u8]) -> VersionClass {
    for (index, (version, marker)) in VERSION_MARKERS.iter().enumerate() {
        if prefix.starts_with(marker.as_bytes()) {
            return if index == 0 {
                VersionClass::Current
            } else {
                VersionClass::Legacy(version)
            };
        }
    }
    VersionClass::Unknown
}

/// A classified stream whose sniffed prefix is replayed before the remaining bytes.
#[derive(Debug)]
pub struct Sniffed<R> {
    class: VersionClass,
    reader: Chain<Cursor<Vec<u8>>, R>,
}

impl<R: Read> Sniffed<R> {
    pub fn class(&self) -> VersionClass {
        self.class
    }

    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        self.reader
    }
}

/// Reads the version prefix of `reader` and classifies it.
///
/// Short reads are retried until the prefix is complete or the stream ends.
pub fn sniff<R: Read>(mut reader: R) -> io::Result<Sniffed<R>> {
    let mut prefix = vec![0u8; marker_len()];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    prefix.truncate(filled);

    let class = classify(&prefix);
    Ok(Sniffed {
        class,
        reader: Cursor::new(prefix).chain(reader),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use rstest::rstest;

    use super::{classify, sniff, VersionClass};

    /// Hands out at most three bytes per read.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[rstest]
    #[case("<map version=\"0.9.0\"><node TEXT=\"a\"/></map>", VersionClass::Current)]
    #[case("<map version=\"0.8.0\">\n</map>", VersionClass::Legacy("0.8.0"))]
    #[case("<map version=\"0.7.1\">\n</map>", VersionClass::Legacy("0.7.1"))]
    #[case("<map version=\"0.6.0\">\n</map>", VersionClass::Unknown)]
    #[case("<?xml version=\"1.0\"?><map>", VersionClass::Unknown)]
    #[case("", VersionClass::Unknown)]
    fn sniff_classifies_and_keeps_every_byte(#[case] input: &str, #[case] expected: VersionClass) {
        let sniffed = sniff(Trickle(input.as_bytes())).unwrap();
        assert_eq!(sniffed.class(), expected);

        let mut replayed = String::new();
        sniffed.into_reader().read_to_string(&mut replayed).unwrap();
        assert_eq!(replayed, input);
    }

    #[test]
    fn current_marker_matches_written_version() {
        let marker = format!("<map version=\"{}\"", crate::format::CURRENT_FORMAT_VERSION);
        assert_eq!(classify(marker.as_bytes()), VersionClass::Current);
    }

    #[test]
    fn truncated_marker_is_unknown() {
        assert_eq!(classify(b"<map version=\"0.9"), VersionClass::Unknown);
    }
}
