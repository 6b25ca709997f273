// XML datasource implementation using roxmltree
use roxmltree::{Node, ParsingOptions};
use std::cmp::Ordering;

/// Metadata records routinely carry a DOCTYPE, so DTDs are accepted.
fn parsing_options<'a>() -> ParsingOptions<'a> {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

/// A parsed input document.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse_with_options(text, parsing_options())?;
        Ok(Self { doc })
    }

    pub fn root(&self) -> XmlNode<'_, 'input> {
        XmlNode::Node(self.doc.root())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// A node of the input tree.
///
/// roxmltree stores attributes as data on their element rather than as
/// nodes, so an attribute is addressed by its parent and index.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Node(Node<'a, 'input>),
    Attribute { parent: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn kind(&self) -> NodeKind {
        match self {
            XmlNode::Node(node) => {
                if node.is_root() {
                    NodeKind::Root
                } else if node.is_element() {
                    NodeKind::Element
                } else if node.is_text() {
                    NodeKind::Text
                } else if node.is_comment() {
                    NodeKind::Comment
                } else {
                    NodeKind::ProcessingInstruction
                }
            }
            XmlNode::Attribute { .. } => NodeKind::Attribute,
        }
    }

    fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'input>> {
        match self {
            XmlNode::Attribute { parent, index } => parent.attributes().nth(*index),
            XmlNode::Node(_) => None,
        }
    }

    /// Local part of the node's name; empty for unnamed nodes.
    pub fn local_name(&self) -> &'a str {
        match self {
            XmlNode::Node(node) if node.is_element() => node.tag_name().name(),
            XmlNode::Node(node) => node.pi().map(|pi| pi.target).unwrap_or(""),
            XmlNode::Attribute { .. } => self.attribute().map(|a| a.name()).unwrap_or(""),
        }
    }

    pub fn namespace(&self) -> Option<&'a str> {
        match self {
            XmlNode::Node(node) if node.is_element() => node.tag_name().namespace(),
            XmlNode::Node(_) => None,
            XmlNode::Attribute { .. } => self.attribute().and_then(|a| a.namespace()),
        }
    }

    /// The prefix the input document uses for this node's namespace.
    pub fn prefix(&self) -> Option<&'a str> {
        let ns = self.namespace()?;
        match self {
            XmlNode::Node(node) => node.lookup_prefix(ns),
            XmlNode::Attribute { parent, .. } => parent.lookup_prefix(ns),
        }
    }

    /// `prefix:local`, or `local` when the node has no prefix.
    pub fn qualified_name(&self) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, self.local_name()),
            None => self.local_name().to_string(),
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            XmlNode::Node(node) => {
                if node.is_element() || node.is_root() {
                    node.descendants()
                        .filter(|n| n.is_text())
                        .filter_map(|n| n.text())
                        .collect()
                } else if node.is_pi() {
                    node.pi()
                        .and_then(|pi| pi.value)
                        .unwrap_or("")
                        .to_string()
                } else {
                    node.text().unwrap_or("").to_string()
                }
            }
            XmlNode::Attribute { .. } => self
                .attribute()
                .map(|a| a.value().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Node(node) => node.parent().map(XmlNode::Node),
            XmlNode::Attribute { parent, .. } => Some(XmlNode::Node(*parent)),
        }
    }

    pub fn children(&self) -> Vec<Self> {
        match self {
            XmlNode::Node(node) => node.children().map(XmlNode::Node).collect(),
            XmlNode::Attribute { .. } => Vec::new(),
        }
    }

    pub fn attributes(&self) -> Vec<Self> {
        match self {
            XmlNode::Node(node) if node.is_element() => {
                let parent = *node;
                (0..node.attributes().len())
                    .map(|index| XmlNode::Attribute { parent, index })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Descendants in document order, excluding the node itself.
    pub fn descendants(&self) -> Vec<Self> {
        match self {
            XmlNode::Node(node) => node.descendants().skip(1).map(XmlNode::Node).collect(),
            XmlNode::Attribute { .. } => Vec::new(),
        }
    }

    /// Ancestors nearest first, excluding the node itself.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            out.push(node);
        }
        out
    }

    pub fn following_siblings(&self) -> Vec<Self> {
        let mut out = Vec::new();
        if let XmlNode::Node(node) = self {
            let mut current = node.next_sibling();
            while let Some(sibling) = current {
                out.push(XmlNode::Node(sibling));
                current = sibling.next_sibling();
            }
        }
        out
    }

    /// Preceding siblings nearest first.
    pub fn preceding_siblings(&self) -> Vec<Self> {
        let mut out = Vec::new();
        if let XmlNode::Node(node) = self {
            let mut current = node.prev_sibling();
            while let Some(sibling) = current {
                out.push(XmlNode::Node(sibling));
                current = sibling.prev_sibling();
            }
        }
        out
    }

    /// The underlying roxmltree node, for anything but an attribute.
    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self {
            XmlNode::Node(node) => Some(*node),
            XmlNode::Attribute { .. } => None,
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Document order. An element's attributes sort after the element and
/// before its children; roxmltree ids are assigned in document order.
impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (XmlNode::Node(a), XmlNode::Node(b)) => a.id().get().cmp(&b.id().get()),
            (
                XmlNode::Attribute { parent: p1, index: i1 },
                XmlNode::Attribute { parent: p2, index: i2 },
            ) => p1.id().get().cmp(&p2.id().get()).then(i1.cmp(i2)),
            (XmlNode::Node(n), XmlNode::Attribute { parent, .. }) => {
                if n.id() == parent.id() {
                    Ordering::Less
                } else {
                    n.id().get().cmp(&parent.id().get())
                }
            }
            (XmlNode::Attribute { parent, .. }, XmlNode::Node(n)) => {
                if parent.id() == n.id() {
                    Ordering::Greater
                } else {
                    parent.id().get().cmp(&n.id().get())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element<'a, 'i>(node: XmlNode<'a, 'i>, name: &str) -> XmlNode<'a, 'i> {
        node.children()
            .into_iter()
            .find(|n| n.kind() == NodeKind::Element && n.local_name() == name)
            .unwrap()
    }

    #[test]
    fn test_attributes_are_addressable_nodes() {
        let doc = XmlDocument::parse(r#"<root><item id="123" status="active">Text</item></root>"#)
            .unwrap();
        let item = first_element(first_element(doc.root(), "root"), "item");

        let attrs = item.attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].kind(), NodeKind::Attribute);
        assert_eq!(attrs[0].local_name(), "id");
        assert_eq!(attrs[1].string_value(), "active");
        assert_eq!(attrs[0].parent(), Some(item));
    }

    #[test]
    fn test_document_order_places_attributes_before_children() {
        let doc = XmlDocument::parse(r#"<a x="1"><b/></a>"#).unwrap();
        let a = first_element(doc.root(), "a");
        let b = first_element(a, "b");
        let x = a.attributes()[0];

        let mut nodes = vec![b, x, a];
        nodes.sort();
        assert_eq!(nodes, vec![a, x, b]);
    }

    #[test]
    fn test_string_value_concatenates_descendant_text() {
        let doc = XmlDocument::parse("<p>one <b>two</b> three</p>").unwrap();
        assert_eq!(doc.root().string_value(), "one two three");
    }

    #[test]
    fn test_prefixed_names() {
        let doc = XmlDocument::parse(r#"<gmd:MD xmlns:gmd="urn:gmd"><gmd:title/></gmd:MD>"#)
            .unwrap();
        let md = doc.root().children()[0];
        assert_eq!(md.local_name(), "MD");
        assert_eq!(md.namespace(), Some("urn:gmd"));
        assert_eq!(md.qualified_name(), "gmd:MD");
    }

    #[test]
    fn test_accepts_doctype() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE metadata SYSTEM "meta.dtd"><metadata/>"#;
        assert!(XmlDocument::parse(xml).is_ok());
    }

    #[test]
    fn test_axes() {
        let doc = XmlDocument::parse("<r><a/><b/><c/></r>").unwrap();
        let r = first_element(doc.root(), "r");
        let b = first_element(r, "b");
        assert_eq!(b.following_siblings().len(), 1);
        assert_eq!(b.preceding_siblings()[0].local_name(), "a");
        assert_eq!(b.ancestors().len(), 2);
        assert_eq!(r.descendants().len(), 3);
    }
}
