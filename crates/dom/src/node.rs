//! Node identifiers, names, and the node kind union.

use std::fmt;

/// Index of a node inside its owning [`Document`](crate::Document) arena.
///
/// Ids are only meaningful together with the document that created them;
/// comparing ids from the same parsed document compares document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A qualified name: optional prefix plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn local(name: &str) -> Self {
        QName { prefix: None, local: name.to_string() }
    }

    /// Splits `p:local` on the first colon; a name without a colon has no prefix.
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) => QName {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => QName::local(name),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A namespace declaration carried on an element (`xmlns` or `xmlns:p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// `None` for the default namespace declaration.
    pub prefix: Option<String>,
    pub uri: String,
}

/// The tagged union of node kinds in a document tree.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Document {
        children: Vec<NodeId>,
    },
    Element {
        name: QName,
        /// URI the element name is bound to, if any.
        ns_uri: Option<String>,
        /// Namespace declarations appearing on this element.
        ns_decls: Vec<NsDecl>,
        attributes: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Attribute {
        name: QName,
        ns_uri: Option<String>,
        value: String,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl NodeKind {
    /// True for text and CDATA nodes, the two character-data kinds.
    pub fn is_character_data(&self) -> bool {
        matches!(self, NodeKind::Text(_) | NodeKind::CData(_))
    }
}

pub(crate) struct NodeData {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}
