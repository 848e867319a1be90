//! Parsed HTML documents and node handles
//!
//! Uses the scraper crate's lenient html5ever parser. Query evaluation sees four kinds of
//! nodes: the document root, elements, text and attributes. Comments, doctypes and
//! processing instructions are invisible to queries and to markup rendering.

use std::collections::BTreeMap;

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};

/// Elements rendered without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// A parsed HTML document
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse HTML text into a navigable tree
    pub fn parse(text: &str) -> Self {
        Self {
            html: Html::parse_document(text),
        }
    }

    /// The document node, used as the context for top-level page schemas
    pub fn root(&self) -> XNode<'_> {
        XNode::Document(self.html.tree.root())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}

/// Handle into a parsed document
#[derive(Debug, Clone, Copy)]
pub enum XNode<'a> {
    Document(NodeRef<'a, Node>),
    Element(ElementRef<'a>),
    Text(NodeRef<'a, Node>),
    Attribute {
        owner: ElementRef<'a>,
        name: &'a str,
        value: &'a str,
    },
}

impl<'a> XNode<'a> {
    /// Wrap a raw tree node. Returns `None` for node kinds queries never see.
    pub fn from_node(node: NodeRef<'a, Node>) -> Option<Self> {
        match node.value() {
            Node::Document | Node::Fragment => Some(XNode::Document(node)),
            Node::Element(_) => ElementRef::wrap(node).map(XNode::Element),
            Node::Text(_) => Some(XNode::Text(node)),
            _ => None,
        }
    }

    /// Underlying tree node (the owner element for attributes)
    pub fn tree_node(&self) -> NodeRef<'a, Node> {
        match *self {
            XNode::Document(n) | XNode::Text(n) => n,
            XNode::Element(el) => *el,
            XNode::Attribute { owner, .. } => *owner,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, XNode::Element(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, XNode::Attribute { .. })
    }

    /// Element tag name or attribute name
    pub fn name(&self) -> Option<&'a str> {
        match *self {
            XNode::Element(el) => Some(el.value().name()),
            XNode::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Attribute of an element node
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        match *self {
            XNode::Element(el) => el.value().attr(name),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<XNode<'a>> {
        match *self {
            XNode::Attribute { owner, .. } => Some(XNode::Element(owner)),
            _ => self.tree_node().parent().and_then(XNode::from_node),
        }
    }

    /// Element and text children, in document order
    pub fn children(&self) -> Vec<XNode<'a>> {
        match *self {
            XNode::Document(n) => n.children().filter_map(XNode::from_node).collect(),
            XNode::Element(el) => el.children().filter_map(XNode::from_node).collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    /// XPath string-value: concatenated descendant text for elements and documents
    pub fn string_value(&self) -> String {
        match *self {
            XNode::Text(n) => n
                .value()
                .as_text()
                .map(|t| String::from(&**t))
                .unwrap_or_default(),
            XNode::Attribute { value, .. } => value.to_string(),
            XNode::Element(_) | XNode::Document(_) => {
                let mut out = String::new();
                collect_text(self.tree_node(), &mut out);
                out
            }
        }
    }

    /// Trimmed string-value
    pub fn text_content(&self) -> String {
        self.string_value().trim().to_string()
    }

    /// Serialized markup of the node's children, nested tags preserved
    pub fn inner_markup(&self) -> String {
        match *self {
            XNode::Element(_) | XNode::Document(_) => {
                let mut out = String::new();
                for child in self.children() {
                    write_markup(child, &mut out);
                }
                out
            }
            _ => self.string_value(),
        }
    }

    /// Stable identity used to de-duplicate node-sets
    pub(crate) fn identity(&self) -> (ego_tree::NodeId, Option<&'a str>) {
        match *self {
            XNode::Attribute { owner, name, .. } => (owner.id(), Some(name)),
            _ => (self.tree_node().id(), None),
        }
    }

    /// Sort key reproducing document order
    pub(crate) fn order_key(&self) -> Vec<usize> {
        let mut key = Vec::new();
        let mut current = Some(self.tree_node());
        while let Some(node) = current {
            if node.parent().is_some() {
                key.push(node.prev_siblings().count() + 1);
            }
            current = node.parent();
        }
        key.reverse();
        if let XNode::Attribute { owner, name, .. } = *self {
            let index = owner
                .value()
                .attrs()
                .position(|(n, _)| n == name)
                .unwrap_or(0);
            key.push(0);
            key.push(index);
        }
        key
    }

    /// Owned copy of the node, detached from the document lifetime
    pub fn snapshot(&self) -> NodeSnapshot {
        let (kind, attributes) = match *self {
            XNode::Document(_) => (NodeKind::Document, BTreeMap::new()),
            XNode::Text(_) => (NodeKind::Text, BTreeMap::new()),
            XNode::Attribute { .. } => (NodeKind::Attribute, BTreeMap::new()),
            XNode::Element(el) => (
                NodeKind::Element,
                el.value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        };

        NodeSnapshot {
            kind,
            name: self.name().map(String::from),
            attributes,
            text: self.string_value(),
            inner_html: self.inner_markup(),
        }
    }
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => collect_text(child, out),
            _ => {}
        }
    }
}

fn write_markup(node: XNode<'_>, out: &mut String) {
    match node {
        XNode::Text(_) => out.push_str(&node.string_value()),
        XNode::Element(el) => {
            let tag = el.value().name();
            out.push('<');
            out.push_str(tag);
            for (name, value) in el.value().attrs() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(value);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag) {
                return;
            }
            for child in node.children() {
                write_markup(child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        XNode::Document(_) => {
            for child in node.children() {
                write_markup(child, out);
            }
        }
        XNode::Attribute { value, .. } => out.push_str(value),
    }
}

/// Kind of a captured node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Attribute,
}

/// Owned capture of a matched node
///
/// Records outlive the document they were extracted from, so "raw node" fields keep
/// this snapshot instead of a borrowed handle.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub inner_html: String,
}

impl NodeSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Trimmed text content
    pub fn text_content(&self) -> &str {
        self.text.trim()
    }

    /// String form used on the wire: inner markup for elements, falling back to text
    pub fn to_wire_string(&self) -> String {
        match self.kind {
            NodeKind::Element if !self.inner_html.is_empty() => self.inner_html.clone(),
            _ => self.text.clone(),
        }
    }
}
