//! Event-driven document parsing on top of quick-xml.

use crate::document::{Doctype, Document};
use crate::error::DomError;
use crate::node::{NodeId, NsDecl, QName};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};

impl Document {
    /// Parses a full document, resolving namespace declarations as the tree
    /// is built.
    pub fn parse(text: &str) -> Result<Document, DomError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut doc = Document::new();
        let mut stack: Vec<NodeId> = vec![doc.root()];

        loop {
            match reader.read_event()? {
                XmlEvent::Start(e) => {
                    let parent = last_open(&doc, &stack);
                    let el = open_element(&mut doc, parent, &e)?;
                    stack.push(el);
                }
                XmlEvent::Empty(e) => {
                    let parent = last_open(&doc, &stack);
                    open_element(&mut doc, parent, &e)?;
                }
                XmlEvent::End(e) => {
                    if stack.len() <= 1 {
                        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                        return Err(DomError::UnexpectedClose(name));
                    }
                    stack.pop();
                }
                XmlEvent::Text(e) => {
                    let text = e.unescape()?;
                    if !text.is_empty() {
                        let parent = last_open(&doc, &stack);
                        let node = doc.create_text(&text);
                        doc.append_child(parent, node);
                    }
                }
                XmlEvent::CData(e) => {
                    let content = std::str::from_utf8(e.as_ref())?;
                    let parent = last_open(&doc, &stack);
                    let node = doc.create_cdata(content);
                    doc.append_child(parent, node);
                }
                XmlEvent::Comment(e) => {
                    let content = std::str::from_utf8(e.as_ref())?;
                    let parent = last_open(&doc, &stack);
                    let node = doc.create_comment(content);
                    doc.append_child(parent, node);
                }
                XmlEvent::PI(e) => {
                    let content = std::str::from_utf8(e.as_ref())?;
                    let (target, data) = match content.split_once(char::is_whitespace) {
                        Some((t, d)) => (t, d.trim_start()),
                        None => (content, ""),
                    };
                    let parent = last_open(&doc, &stack);
                    let node = doc.create_pi(target, data);
                    doc.append_child(parent, node);
                }
                XmlEvent::Decl(e) => {
                    doc.version = Some(String::from_utf8(e.version()?.into_owned())?);
                    if let Some(enc) = e.encoding() {
                        doc.encoding = Some(String::from_utf8(enc?.into_owned())?);
                    }
                }
                XmlEvent::DocType(e) => {
                    let content = std::str::from_utf8(e.as_ref())?;
                    doc.doctype = Some(parse_doctype(content));
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }

        if stack.len() != 1 {
            return Err(DomError::UnclosedElements);
        }
        Ok(doc)
    }
}

fn last_open(doc: &Document, stack: &[NodeId]) -> NodeId {
    stack.last().copied().unwrap_or_else(|| doc.root())
}

/// Creates an element for a start or empty tag, attaches it under `parent`,
/// and resolves its own and its attributes' namespace prefixes.
fn open_element(doc: &mut Document, parent: NodeId, e: &BytesStart) -> Result<NodeId, DomError> {
    let e_name = e.name();
    let raw_name = std::str::from_utf8(e_name.as_ref())?;
    let name = QName::parse(raw_name);
    let el = doc.create_element(name.clone());

    let mut plain_attrs: Vec<(QName, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            doc.add_ns_decl(el, NsDecl { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            doc.add_ns_decl(el, NsDecl { prefix: Some(prefix.to_string()), uri: value });
        } else {
            plain_attrs.push((QName::parse(key), value));
        }
    }

    doc.append_child(parent, el);

    // Unprefixed element names take the default namespace; unprefixed
    // attributes take none.
    let uri = doc.lookup_ns_uri(el, name.prefix.as_deref()).map(str::to_string);
    doc.set_element_ns(el, uri);

    for (qname, value) in plain_attrs {
        let ns = match &qname.prefix {
            Some(p) => {
                let uri = doc.lookup_ns_uri(el, Some(p)).map(str::to_string);
                if uri.is_none() {
                    log::warn!("no namespace bound to attribute prefix {}", p);
                }
                uri
            }
            None => None,
        };
        doc.set_attribute(el, qname, ns, &value);
    }

    Ok(el)
}

fn parse_doctype(content: &str) -> Doctype {
    let content = content.trim();
    let name: String = content
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    let rest = content[name.len()..].trim_start();
    let mut public_id = None;
    let mut system_id = None;
    if let Some(r) = rest.strip_prefix("PUBLIC") {
        let mut lits = quoted_literals(r);
        public_id = lits.next();
        system_id = lits.next();
    } else if let Some(r) = rest.strip_prefix("SYSTEM") {
        system_id = quoted_literals(r).next();
    }
    Doctype { name, public_id, system_id }
}

fn quoted_literals(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split('"').skip(1).step_by(2).map(str::to_string)
}
