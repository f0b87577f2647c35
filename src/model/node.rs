// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Mapkeep-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Mapkeep and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// A single node of a mind map tree.
///
/// The persistence layer treats the tree as opaque content: it only needs the root text (for
/// file-name proposals and degraded placeholder documents) and a way to walk the children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapNode {
    text: String,
    children: Vec<MapNode>,
}

impl MapNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: MapNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn children(&self) -> &[MapNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<MapNode> {
        &mut self.children
    }

    /// Node text with markup removed.
    ///
    /// Node text may hold an HTML fragment (rich text nodes); tags are dropped and whitespace
    /// runs collapsed. Plain text passes through trimmed.
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut in_tag = false;
        for ch in self.text.chars() {
            match ch {
                '<' => in_tag = true,
                '>' if in_tag => {
                    in_tag = false;
                    out.push(' ');
                }
                _ if in_tag => {}
                _ => out.push(ch),
            }
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MapNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::MapNode;

    #[test]
    fn plain_text_strips_html_markup() {
        let node = MapNode::new("<html><body><p>Project   plan</p></body></html>");
        assert_eq!(node.plain_text(), "Project plan");
    }

    #[test]
    fn node_count_includes_all_descendants() {
        let root = MapNode::new("root")
            .with_child(MapNode::new("a").with_child(MapNode::new("a1")))
            .with_child(MapNode::new("b"));
        assert_eq!(root.node_count(), 4);
    }
}
