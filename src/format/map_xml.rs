// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read, Write};

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use super::{FormatError, TreeParser, TreeWriter, CURRENT_FORMAT_VERSION};
use crate::model::MapNode;

const TEXT_ATTRIBUTE: &[u8] = b"TEXT";

/// The `<map><node TEXT="..."/></map>` document format.
///
/// Only `<node>` elements and their `TEXT` attribute are interpreted. Other elements (icons,
/// fonts, notes, rich content, ...) are accepted and dropped together with any `<node>` nested
/// inside them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapXmlFormat;

impl TreeParser for MapXmlFormat {
    fn parse(&self, input: &mut dyn Read) -> Result<MapNode, FormatError> {
        read_map(Reader::from_reader(BufReader::new(input)))
    }
}

impl TreeWriter for MapXmlFormat {
    fn write(&self, root: &MapNode, out: &mut dyn Write) -> Result<(), FormatError> {
        let mut writer = Writer::new_with_indent(out, b' ', 1);

        let mut map = BytesStart::new("map");
        map.push_attribute(("version", CURRENT_FORMAT_VERSION));
        writer.write_event(Event::Start(map))?;
        write_node(&mut writer, root)?;
        writer.write_event(Event::End(BytesEnd::new("map")))?;
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

#[derive(Debug)]
enum Frame {
    Map,
    Node(MapNode),
    Other(String),
}

impl Frame {
    fn name(&self) -> &str {
        match self {
            Self::Map => "map",
            Self::Node(_) => "node",
            Self::Other(name) => name,
        }
    }
}

pub fn parse_map(src: &str) -> Result<MapNode, FormatError> {
    read_map(Reader::from_str(src))
}

fn read_map<R: BufRead>(mut reader: Reader<R>) -> Result<MapNode, FormatError> {
    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root = None;
    let mut seen_map = false;

    loop {
        let offset = reader.buffer_position();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| FormatError::Xml { offset, source })?;
        match event {
            Event::Start(tag) => {
                let frame = open_frame(&tag, &stack, seen_map, offset)?;
                seen_map = true;
                stack.push(frame);
            }
            Event::Empty(tag) => {
                let frame = open_frame(&tag, &stack, seen_map, offset)?;
                seen_map = true;
                close_frame(frame, &mut stack, &mut root, offset)?;
            }
            Event::End(_) => {
                // The reader checks that end tags match their start tags.
                if let Some(frame) = stack.pop() {
                    close_frame(frame, &mut stack, &mut root, offset)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(frame) = stack.last() {
        return Err(FormatError::Unclosed {
            tag: frame.name().to_owned(),
        });
    }
    if !seen_map {
        return Err(FormatError::MissingMapRoot);
    }
    root.ok_or(FormatError::MissingRootNode)
}

fn open_frame(
    tag: &BytesStart<'_>,
    stack: &[Frame],
    seen_map: bool,
    offset: usize,
) -> Result<Frame, FormatError> {
    let name = tag.name();
    match stack.last() {
        None if seen_map => Err(FormatError::TrailingElement {
            offset,
            name: String::from_utf8_lossy(name.as_ref()).into_owned(),
        }),
        None if name.as_ref() == b"map" => Ok(Frame::Map),
        None => Err(FormatError::MissingMapRoot),
        Some(Frame::Map | Frame::Node(_)) if name.as_ref() == b"node" => {
            Ok(Frame::Node(MapNode::new(node_text(tag, offset)?)))
        }
        Some(_) => Ok(Frame::Other(
            String::from_utf8_lossy(name.as_ref()).into_owned(),
        )),
    }
}

fn close_frame(
    frame: Frame,
    stack: &mut [Frame],
    root: &mut Option<MapNode>,
    offset: usize,
) -> Result<(), FormatError> {
    let Frame::Node(node) = frame else {
        return Ok(());
    };
    match stack.last_mut() {
        Some(Frame::Node(parent)) => parent.children_mut().push(node),
        Some(Frame::Map) if root.is_some() => {
            return Err(FormatError::MultipleRootNodes { offset })
        }
        Some(Frame::Map) => *root = Some(node),
        // Nodes are only opened directly below the map or another node.
        Some(Frame::Other(_)) | None => {}
    }
    Ok(())
}

fn node_text(tag: &BytesStart<'_>, offset: usize) -> Result<String, FormatError> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|source| FormatError::Attribute { offset, source })?;
        if attr.key.as_ref() == TEXT_ATTRIBUTE {
            return attr
                .unescape_value()
                .map(Cow::into_owned)
                .map_err(|source| FormatError::Xml { offset, source });
        }
    }
    Ok(String::new())
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &MapNode) -> Result<(), FormatError> {
    let mut tag = BytesStart::new("node");
    tag.push_attribute(Attribute {
        key: QName(TEXT_ATTRIBUTE),
        value: Cow::Owned(escape_attribute(node.text()).into_bytes()),
    });

    if node.children().is_empty() {
        writer.write_event(Event::Empty(tag))?;
        return Ok(());
    }
    writer.write_event(Event::Start(tag))?;
    for child in node.children() {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new("node")))?;
    Ok(())
}

/// Escapes markup characters plus line breaks and tabs, which attribute value normalization
/// would otherwise turn into spaces.
fn escape_attribute(text: &str) -> String {
    let escaped = escape(text);
    let mut out = String::with_capacity(escaped.len());
    for ch in escaped.chars() {
        match ch {
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{parse_map, MapXmlFormat};
    use crate::format::{FormatError, TreeParser, TreeWriter};
    use crate::model::MapNode;

    #[test]
    fn parses_nested_nodes_and_skips_foreign_elements() {
        let src = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="0.9.0">
<!-- saved by hand -->
<node TEXT="Root">
<font NAME="SansSerif" SIZE="12"/>
<node TEXT="A &amp; B">
<icon BUILTIN="idea"/>
</node>
<node TEXT='single &#x3c;quoted&#62;'/>
</node>
</map>
"#;
        let root = parse_map(src).unwrap();
        assert_eq!(root.text(), "Root");
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].text(), "A & B");
        assert_eq!(root.children()[1].text(), "single <quoted>");
    }

    #[test]
    fn cdata_notes_inside_nodes_are_accepted() {
        let src = "<map version=\"0.9.0\"><node TEXT=\"a\"><note><![CDATA[x < y]]></note>\
                   <node TEXT=\"b\"/></node></map>";
        let root = parse_map(src).unwrap();
        assert_eq!(root.text(), "a");
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].text(), "b");
    }

    #[rstest]
    #[case("<map\nversion=\"0.9.0\"><node\n\tTEXT=\"spread\"\n/></map>")]
    #[case("<map version=\"0.9.0\" ><node  ID=\"ID_1\"   TEXT=\"spread\" /></map>")]
    fn whitespace_between_attributes_is_tolerated(#[case] src: &str) {
        assert_eq!(parse_map(src).unwrap().text(), "spread");
    }

    #[test]
    fn nodes_below_foreign_elements_are_dropped() {
        let src = "<map><node TEXT=\"root\"><hook NAME=\"x\"><node TEXT=\"hidden\"/></hook></node></map>";
        let root = parse_map(src).unwrap();
        assert!(root.children().is_empty());
    }

    #[test]
    fn writer_output_parses_back_to_same_tree() {
        let root = MapNode::new("Plan \"2026\"\nline two")
            .with_child(MapNode::new("<b>bold</b> & co").with_child(MapNode::new("deep")))
            .with_child(MapNode::new("tab\there\r\n"));

        let mut out = Vec::new();
        MapXmlFormat.write(&root, &mut out).unwrap();
        assert!(out.starts_with(b"<map version=\"0.9.0\">"));
        assert!(out.ends_with(b"</map>\n"));

        let parsed = MapXmlFormat.parse(&mut out.as_slice()).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn gt_inside_attribute_value_does_not_end_tag() {
        let root = parse_map("<map><node TEXT=\"a > b\"/></map>").unwrap();
        assert_eq!(root.text(), "a > b");
    }

    #[rstest]
    #[case("")]
    #[case("just text")]
    #[case("<node TEXT=\"x\"/>")]
    fn documents_without_map_root_are_rejected(#[case] src: &str) {
        assert!(matches!(parse_map(src), Err(FormatError::MissingMapRoot)));
    }

    #[test]
    fn map_without_node_is_rejected() {
        assert!(matches!(
            parse_map("<map version=\"0.9.0\"></map>"),
            Err(FormatError::MissingRootNode)
        ));
    }

    #[test]
    fn second_root_node_is_rejected() {
        assert!(matches!(
            parse_map("<map><node TEXT=\"a\"/><node TEXT=\"b\"/></map>"),
            Err(FormatError::MultipleRootNodes { .. })
        ));
    }

    #[test]
    fn unclosed_node_is_rejected() {
        let err = parse_map("<map><node TEXT=\"a\">").unwrap_err();
        let unclosed_node = matches!(&err, FormatError::Unclosed { tag } if tag == "node");
        assert!(unclosed_node || matches!(err, FormatError::Xml { .. }), "{err}");
    }

    #[test]
    fn content_after_the_map_is_rejected() {
        assert!(matches!(
            parse_map("<map><node TEXT=\"a\"/></map><map/>"),
            Err(FormatError::TrailingElement { .. })
        ));
    }

    #[rstest]
    #[case("<map><node TEXT=\"a\"></map>")]
    #[case("<map><node TEXT=\"&bogus;\"/></map>")]
    fn malformed_xml_is_rejected(#[case] src: &str) {
        assert!(matches!(parse_map(src), Err(FormatError::Xml { .. })));
    }

    #[test]
    fn unquoted_attribute_is_rejected() {
        assert!(matches!(
            parse_map("<map><node TEXT=unquoted/></map>"),
            Err(FormatError::Attribute { .. })
        ));
    }
}
