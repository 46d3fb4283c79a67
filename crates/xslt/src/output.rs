//! The result builder: appends output under the insertion point and copies
//! literal result elements with namespace reuse.

use crate::ast::LiteralElement;
use folio_dom::{Document, NodeId, NodeKind, NsDecl};

/// Appends text under `insert`, merging into a preceding text sibling so
/// consecutive emissions form a single node.
pub(crate) fn append_text(result: &mut Document, insert: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(&last) = result.children(insert).last() {
        if matches!(result.kind(last), NodeKind::Text(_)) {
            result.extend_text(last, text);
            return;
        }
    }
    let node = result.create_text(text);
    result.append_child(insert, node);
}

pub(crate) fn append_comment(result: &mut Document, insert: NodeId, content: &str) {
    let node = result.create_comment(content);
    result.append_child(insert, node);
}

pub(crate) fn append_pi(result: &mut Document, insert: NodeId, target: &str, data: &str) {
    let node = result.create_pi(target, data);
    result.append_child(insert, node);
}

/// Copies a literal result element under `insert`: a shallow copy carrying
/// the declaration list, with the primary namespace binding reused from the
/// result tree when possible.
///
/// Binding resolution, in order: the parent's own binding when its URI
/// matches, then any in-scope declaration with the same URI, then a fresh
/// declaration on the copy using the stylesheet prefix.
pub(crate) fn copy_literal_element(
    result: &mut Document,
    insert: NodeId,
    element: &LiteralElement,
) -> NodeId {
    let copy = result.create_element(element.name.clone());
    for decl in &element.ns_decls {
        result.add_ns_decl(copy, decl.clone());
    }
    result.append_child(insert, copy);

    if let Some(uri) = &element.ns_uri {
        let parent_binding = result.is_element(insert) && result.ns_uri(insert) == Some(uri.as_str());
        if parent_binding {
            let prefix = result.name(insert).and_then(|q| q.prefix.clone());
            result.set_element_prefix(copy, prefix);
        } else {
            let in_scope = result.lookup_ns_by_uri(copy, uri).map(|d| d.prefix.clone());
            match in_scope {
                Some(prefix) => result.set_element_prefix(copy, prefix),
                None => result.add_ns_decl(
                    copy,
                    NsDecl { prefix: element.name.prefix.clone(), uri: uri.clone() },
                ),
            }
        }
        result.set_element_ns(copy, Some(uri.clone()));
    }
    copy
}
