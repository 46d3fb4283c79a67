//! Rendering a document tree back to markup via the quick-xml writer.

use crate::document::Document;
use crate::error::DomError;
use crate::node::{NodeId, NodeKind};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesPI, BytesStart, BytesText, Event as XmlEvent};

impl Document {
    /// Serializes the tree to markup. No XML declaration is emitted; the
    /// DOCTYPE is written when one is attached.
    pub fn to_xml_string(&self) -> Result<String, DomError> {
        let mut writer = Writer::new(Vec::new());
        if let Some(dt) = &self.doctype {
            let mut decl = dt.name.clone();
            match (&dt.public_id, &dt.system_id) {
                (Some(public), Some(system)) => {
                    decl.push_str(&format!(" PUBLIC \"{}\" \"{}\"", public, system));
                }
                (Some(public), None) => {
                    decl.push_str(&format!(" PUBLIC \"{}\"", public));
                }
                (None, Some(system)) => {
                    decl.push_str(&format!(" SYSTEM \"{}\"", system));
                }
                (None, None) => {}
            }
            writer.write_event(XmlEvent::DocType(BytesText::from_escaped(decl)))?;
        }
        for &child in self.children(self.root()) {
            self.write_node(&mut writer, child)?;
        }
        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), DomError> {
        match self.kind(id) {
            NodeKind::Element { name, ns_decls, .. } => {
                let tag = name.to_string();
                let mut start = BytesStart::new(tag.as_str());
                for decl in ns_decls {
                    match &decl.prefix {
                        Some(p) => start.push_attribute((format!("xmlns:{}", p).as_str(), decl.uri.as_str())),
                        None => start.push_attribute(("xmlns", decl.uri.as_str())),
                    }
                }
                for &attr in self.attributes(id) {
                    if let NodeKind::Attribute { name, value, .. } = self.kind(attr) {
                        start.push_attribute((name.to_string().as_str(), value.as_str()));
                    }
                }
                let children = self.children(id);
                if children.is_empty() {
                    writer.write_event(XmlEvent::Empty(start))?;
                } else {
                    writer.write_event(XmlEvent::Start(start.clone()))?;
                    for &child in children {
                        self.write_node(writer, child)?;
                    }
                    writer.write_event(XmlEvent::End(start.to_end()))?;
                }
            }
            NodeKind::Text(s) => {
                writer.write_event(XmlEvent::Text(BytesText::new(s)))?;
            }
            NodeKind::CData(s) => {
                writer.write_event(XmlEvent::CData(BytesCData::new(s.as_str())))?;
            }
            NodeKind::Comment(s) => {
                writer.write_event(XmlEvent::Comment(BytesText::from_escaped(s.as_str())))?;
            }
            NodeKind::ProcessingInstruction { target, data } => {
                let content = if data.is_empty() {
                    target.clone()
                } else {
                    format!("{} {}", target, data)
                };
                writer.write_event(XmlEvent::PI(BytesPI::new(content.as_str())))?;
            }
            NodeKind::Document { .. } | NodeKind::Attribute { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NsDecl, QName};

    #[test]
    fn roundtrip_preserves_structure() {
        let src = r#"<r a="1"><b>text</b><c/><!--c--><?pi data?></r>"#;
        let doc = Document::parse(src).unwrap();
        assert_eq!(doc.to_xml_string().unwrap(), src);
    }

    #[test]
    fn text_is_escaped() {
        let mut doc = Document::new();
        let el = doc.create_element(QName::local("r"));
        doc.append_child(doc.root(), el);
        let t = doc.create_text("a < b & c");
        doc.append_child(el, t);
        assert_eq!(doc.to_xml_string().unwrap(), "<r>a &lt; b &amp; c</r>");
    }

    #[test]
    fn namespace_declarations_are_written() {
        let mut doc = Document::new();
        let el = doc.create_element(QName::parse("p:r"));
        doc.append_child(doc.root(), el);
        doc.add_ns_decl(el, NsDecl { prefix: Some("p".into()), uri: "urn:x".into() });
        assert_eq!(doc.to_xml_string().unwrap(), r#"<p:r xmlns:p="urn:x"/>"#);
    }

    #[test]
    fn doctype_is_written() {
        let mut doc = Document::parse("<r/>").unwrap();
        doc.doctype = Some(crate::Doctype {
            name: "r".into(),
            public_id: None,
            system_id: Some("r.dtd".into()),
        });
        assert_eq!(doc.to_xml_string().unwrap(), "<!DOCTYPE r SYSTEM \"r.dtd\"><r/>");
    }
}
