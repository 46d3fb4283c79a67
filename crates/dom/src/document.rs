//! The document arena and its node operations.

use crate::node::{NodeData, NodeId, NodeKind, NsDecl, QName};

/// DOCTYPE information attached to a document.
#[derive(Debug, Clone)]
pub struct Doctype {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// An XML (or HTML-flavoured) document owning all of its nodes.
///
/// Node 0 is always the document node. Detached nodes stay in the arena and
/// are reclaimed when the document is dropped.
pub struct Document {
    nodes: Vec<NodeData>,
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub doctype: Option<Doctype>,
    /// Distinguishes the HTML document flavour produced by the `html`
    /// output method.
    pub html: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![NodeData {
                parent: None,
                kind: NodeKind::Document { children: Vec::new() },
            }],
            version: None,
            encoding: None,
            doctype: None,
            html: false,
        }
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The first element child of the document node, if any.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.is_element(id))
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.data(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.data(id).kind {
            NodeKind::Document { children } | NodeKind::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        match &self.data(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id).kind, NodeKind::Element { .. })
    }

    /// Name of an element or attribute node; the target of a processing
    /// instruction is not a name in this sense.
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match &self.data(id).kind {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn ns_uri(&self, id: NodeId) -> Option<&str> {
        match &self.data(id).kind {
            NodeKind::Element { ns_uri, .. } | NodeKind::Attribute { ns_uri, .. } => {
                ns_uri.as_deref()
            }
            _ => None,
        }
    }

    // --- Node creation ---

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData { parent: None, kind });
        id
    }

    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.push_node(NodeKind::Element {
            name,
            ns_uri: None,
            ns_decls: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push_node(NodeKind::Text(content.to_string()))
    }

    pub fn create_cdata(&mut self, content: &str) -> NodeId {
        self.push_node(NodeKind::CData(content.to_string()))
    }

    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.push_node(NodeKind::Comment(content.to_string()))
    }

    pub fn create_pi(&mut self, target: &str, data: &str) -> NodeId {
        self.push_node(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    // --- Tree mutation ---

    /// Appends `child` as the last child of `parent`. `child` must be
    /// detached; `parent` must be a document or element node.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.data(child).parent.is_none());
        self.data_mut(child).parent = Some(parent);
        match &mut self.data_mut(parent).kind {
            NodeKind::Document { children } | NodeKind::Element { children, .. } => {
                children.push(child);
            }
            _ => {
                log::error!("append_child: parent node cannot hold children");
                self.data_mut(child).parent = None;
            }
        }
    }

    /// Unlinks a node from its parent. The node stays in the arena until the
    /// document is dropped.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.data(id).parent else { return };
        self.data_mut(id).parent = None;
        match &mut self.data_mut(parent).kind {
            NodeKind::Document { children } => children.retain(|&c| c != id),
            NodeKind::Element { children, attributes, .. } => {
                children.retain(|&c| c != id);
                attributes.retain(|&a| a != id);
            }
            _ => {}
        }
    }

    /// Sets an attribute on an element, replacing any existing attribute
    /// with the same expanded name.
    pub fn set_attribute(
        &mut self,
        element: NodeId,
        name: QName,
        ns_uri: Option<String>,
        value: &str,
    ) {
        let existing = self.attributes(element).iter().copied().find(|&a| {
            self.name(a).map(|n| n.local == name.local).unwrap_or(false)
                && self.ns_uri(a) == ns_uri.as_deref()
        });
        if let Some(attr) = existing {
            if let NodeKind::Attribute { value: v, .. } = &mut self.data_mut(attr).kind {
                *v = value.to_string();
            }
            return;
        }
        let attr = self.push_node(NodeKind::Attribute {
            name,
            ns_uri,
            value: value.to_string(),
        });
        self.data_mut(attr).parent = Some(element);
        if let NodeKind::Element { attributes, .. } = &mut self.data_mut(element).kind {
            attributes.push(attr);
        } else {
            log::error!("set_attribute: target node is not an element");
        }
    }

    /// Appends to the content of an existing text node.
    pub fn extend_text(&mut self, id: NodeId, more: &str) {
        if let NodeKind::Text(content) = &mut self.data_mut(id).kind {
            content.push_str(more);
        } else {
            log::error!("extend_text: node is not a text node");
        }
    }

    /// Value of the named (unqualified) attribute of an element.
    pub fn attribute_value(&self, element: NodeId, local: &str) -> Option<&str> {
        self.attributes(element).iter().copied().find_map(|a| {
            match &self.data(a).kind {
                NodeKind::Attribute { name, ns_uri, value } if name.local == local && ns_uri.is_none() => {
                    Some(value.as_str())
                }
                _ => None,
            }
        })
    }

    // --- Namespaces ---

    pub fn add_ns_decl(&mut self, element: NodeId, decl: NsDecl) {
        if let NodeKind::Element { ns_decls, .. } = &mut self.data_mut(element).kind {
            ns_decls.push(decl);
        }
    }

    pub fn ns_decls(&self, id: NodeId) -> &[NsDecl] {
        match &self.data(id).kind {
            NodeKind::Element { ns_decls, .. } => ns_decls,
            _ => &[],
        }
    }

    pub fn set_element_ns(&mut self, element: NodeId, uri: Option<String>) {
        if let NodeKind::Element { ns_uri, .. } = &mut self.data_mut(element).kind {
            *ns_uri = uri;
        }
    }

    pub fn set_element_prefix(&mut self, element: NodeId, prefix: Option<String>) {
        if let NodeKind::Element { name, .. } = &mut self.data_mut(element).kind {
            name.prefix = prefix;
        }
    }

    /// Resolves a prefix against the declarations in scope at `from`,
    /// walking the ancestor chain. `None` looks up the default namespace.
    pub fn lookup_ns_uri(&self, from: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some("http://www.w3.org/XML/1998/namespace");
        }
        let mut cur = Some(from);
        while let Some(id) = cur {
            for decl in self.ns_decls(id) {
                if decl.prefix.as_deref() == prefix {
                    return Some(&decl.uri);
                }
            }
            cur = self.parent(id);
        }
        None
    }

    /// Finds an in-scope declaration binding `uri`, walking upward from
    /// `from`.
    pub fn lookup_ns_by_uri(&self, from: NodeId, uri: &str) -> Option<&NsDecl> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            for decl in self.ns_decls(id) {
                if decl.uri == uri {
                    return Some(decl);
                }
            }
            cur = self.parent(id);
        }
        None
    }

    // --- Content ---

    /// The XPath 1.0 string value of a node: character-data content for
    /// leaves, concatenated descendant character data for elements and
    /// documents, the value for attributes.
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.data(id).kind {
            NodeKind::Text(s) | NodeKind::CData(s) | NodeKind::Comment(s) => s.clone(),
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
            NodeKind::Document { .. } | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match &self.data(child).kind {
                NodeKind::Text(s) | NodeKind::CData(s) => out.push_str(s),
                NodeKind::Element { .. } => self.collect_text(child, out),
                _ => {}
            }
        }
    }
}
