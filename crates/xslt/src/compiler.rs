//! The stylesheet compiler: turns a parsed `xsl:stylesheet` document into a
//! [`CompiledStylesheet`].
//!
//! Compilation fails only on structural problems (wrong root element, a
//! template with neither `match` nor `name`, unparsable XPath). Everything
//! the transformation-time error policy treats as recoverable — missing
//! required attributes, bad attribute values, unrecognized instructions —
//! is reported through the log facade here and the offending piece is
//! dropped, so the rest of the stylesheet still runs.

use crate::ast::{
    Avt, BodyNode, CompiledStylesheet, GlobalDecl, Instruction, LiteralAttribute, LiteralElement,
    OutputSpec, SortKey, SpacePolicy, TemplateRule, When, WithParam, XSLT_NS,
};
use crate::error::XsltError;
use crate::pattern::Pattern;
use crate::transform::is_blank;
use folio_dom::{Document, NodeId, NodeKind, QName};
use folio_xpath1::{Expression, parse_expression};

/// Compiles a parsed stylesheet document.
pub fn compile(doc: &Document) -> Result<CompiledStylesheet, XsltError> {
    let Some(root) = doc.root_element() else {
        return Err(XsltError::Compile(
            "stylesheet document has no root element".to_string(),
        ));
    };
    let root_ok = doc.ns_uri(root) == Some(XSLT_NS)
        && doc
            .name(root)
            .map(|q| q.local == "stylesheet" || q.local == "transform")
            .unwrap_or(false);
    if !root_ok {
        return Err(XsltError::Compile(
            "root element is not xsl:stylesheet or xsl:transform".to_string(),
        ));
    }

    let mut style = CompiledStylesheet::default();
    for &child in doc.children(root) {
        match doc.kind(child) {
            NodeKind::Element { .. } if is_xslt(doc, child) => {
                compile_top_level(doc, child, &mut style)?;
            }
            NodeKind::Element { .. } => {
                log::warn!(
                    "skipping non-XSLT top-level element <{}>",
                    element_name(doc, child)
                );
            }
            NodeKind::Text(text) | NodeKind::CData(text) => {
                if !is_blank(text) {
                    log::warn!("skipping stray text at the stylesheet top level");
                }
            }
            _ => {}
        }
    }
    Ok(style)
}

fn is_xslt(doc: &Document, node: NodeId) -> bool {
    doc.ns_uri(node) == Some(XSLT_NS)
}

fn local_name(doc: &Document, node: NodeId) -> &str {
    doc.name(node).map(|q| q.local.as_str()).unwrap_or("")
}

fn element_name(doc: &Document, node: NodeId) -> String {
    doc.name(node).map(|q| q.to_string()).unwrap_or_default()
}

fn attr(doc: &Document, el: NodeId, name: &str) -> Option<String> {
    doc.attribute_value(el, name).map(str::to_string)
}

fn required_attr(doc: &Document, el: NodeId, name: &str, instruction: &str) -> Option<String> {
    let value = attr(doc, el, name);
    if value.is_none() {
        log::error!("{}: the {} attribute is required", instruction, name);
    }
    value
}

fn parse_select(value: Option<String>) -> Result<Option<Expression>, XsltError> {
    Ok(value.map(|s| parse_expression(&s)).transpose()?)
}

/// Resolves a possibly prefixed name against the declarations in scope at
/// `el` in the stylesheet document.
fn resolve_qname(doc: &Document, el: NodeId, name: &str) -> (String, Option<String>) {
    let qname = QName::parse(name);
    let ns = match &qname.prefix {
        Some(prefix) => {
            let uri = doc.lookup_ns_uri(el, Some(prefix)).map(str::to_string);
            if uri.is_none() {
                log::warn!("no namespace bound to prefix {}", prefix);
            }
            uri
        }
        None => None,
    };
    (qname.local, ns)
}

fn compile_top_level(
    doc: &Document,
    el: NodeId,
    style: &mut CompiledStylesheet,
) -> Result<(), XsltError> {
    match local_name(doc, el) {
        "template" => {
            let rule = compile_template(doc, el)?;
            style.templates.push(rule);
        }
        "output" => {
            style.output = OutputSpec {
                method: attr(doc, el, "method"),
                version: attr(doc, el, "version"),
                encoding: attr(doc, el, "encoding"),
                doctype_public: attr(doc, el, "doctype-public"),
                doctype_system: attr(doc, el, "doctype-system"),
            };
        }
        "strip-space" => compile_space_list(doc, el, style, SpacePolicy::Strip),
        "preserve-space" => compile_space_list(doc, el, style, SpacePolicy::Preserve),
        "variable" | "param" => {
            let is_param = local_name(doc, el) == "param";
            let which = if is_param { "xsl:param" } else { "xsl:variable" };
            let Some(name) = required_attr(doc, el, "name", which) else {
                return Ok(());
            };
            let select = parse_select(attr(doc, el, "select"))?;
            if select.is_none() && doc.children(el).iter().any(|&c| !is_ignorable(doc, c)) {
                log::warn!("{} '{}': content bodies are not supported, the value is empty", which, name);
            }
            style.globals.push(GlobalDecl { name, select, is_param });
        }
        "import" | "include" => {
            log::error!("xsl:{} is not implemented", local_name(doc, el));
        }
        other => {
            log::error!("unrecognized top-level element xsl:{}", other);
        }
    }
    Ok(())
}

fn compile_space_list(doc: &Document, el: NodeId, style: &mut CompiledStylesheet, policy: SpacePolicy) {
    match attr(doc, el, "elements") {
        Some(elements) => {
            for name in elements.split_whitespace() {
                style.strip_space.insert(name.to_string(), policy);
            }
        }
        None => log::error!("xsl:strip-space/preserve-space: the elements attribute is required"),
    }
}

fn compile_template(doc: &Document, el: NodeId) -> Result<TemplateRule, XsltError> {
    let match_attr = attr(doc, el, "match");
    let name_attr = attr(doc, el, "name");
    if match_attr.is_none() && name_attr.is_none() {
        return Err(XsltError::Compile(
            "xsl:template needs a match or name attribute".to_string(),
        ));
    }

    let pattern = match_attr.map(|m| Pattern::parse(&m)).transpose()?;
    let name = name_attr.map(|n| resolve_qname(doc, el, &n));
    let mode = attr(doc, el, "mode");
    let priority = match attr(doc, el, "priority") {
        Some(p) => match p.trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                log::error!("xsl:template: invalid priority '{}'", p);
                default_priority(&pattern)
            }
        },
        None => default_priority(&pattern),
    };
    let body = compile_nodes(doc, doc.children(el))?;
    Ok(TemplateRule { name, pattern, mode, priority, body })
}

fn default_priority(pattern: &Option<Pattern>) -> f64 {
    pattern.as_ref().map(Pattern::default_priority).unwrap_or(0.0)
}

/// Compiles a run of stylesheet nodes into body nodes. Whitespace-only text
/// is dropped here; `xsl:text` is the escape hatch that keeps it.
fn compile_nodes(doc: &Document, nodes: &[NodeId]) -> Result<Vec<BodyNode>, XsltError> {
    let mut body = Vec::new();
    for &node in nodes {
        match doc.kind(node) {
            NodeKind::Text(text) | NodeKind::CData(text) => {
                if !is_blank(text) {
                    body.push(BodyNode::Text(text.clone()));
                }
            }
            NodeKind::Comment(content) => body.push(BodyNode::Comment(content.clone())),
            NodeKind::ProcessingInstruction { target, data } => {
                body.push(BodyNode::Pi { target: target.clone(), data: data.clone() });
            }
            NodeKind::Element { .. } if is_xslt(doc, node) => {
                if let Some(instruction) = compile_instruction(doc, node)? {
                    body.push(BodyNode::Instruction(instruction));
                }
            }
            NodeKind::Element { .. } => {
                body.push(BodyNode::Element(compile_literal_element(doc, node)?));
            }
            _ => {}
        }
    }
    Ok(body)
}

fn compile_literal_element(doc: &Document, el: NodeId) -> Result<LiteralElement, XsltError> {
    let name = doc.name(el).cloned().unwrap_or_else(|| QName::local(""));
    let ns_uri = doc.ns_uri(el).map(str::to_string);
    // The XSLT declaration itself never travels into the result.
    let ns_decls = doc
        .ns_decls(el)
        .iter()
        .filter(|d| d.uri != XSLT_NS)
        .cloned()
        .collect();

    let mut attributes = Vec::new();
    for &attr_node in doc.attributes(el) {
        let NodeKind::Attribute { name, ns_uri, value } = doc.kind(attr_node) else {
            continue;
        };
        if ns_uri.as_deref() == Some(XSLT_NS) {
            log::warn!(
                "literal result element: the xsl:{} attribute is not supported",
                name.local
            );
            continue;
        }
        match Avt::parse(value) {
            Ok(avt) => attributes.push(LiteralAttribute {
                name: name.clone(),
                ns_uri: ns_uri.clone(),
                value: avt,
            }),
            Err(e) => log::error!("attribute {}: {}", name, e),
        }
    }

    let children = compile_nodes(doc, doc.children(el))?;
    Ok(LiteralElement { name, ns_uri, ns_decls, attributes, children })
}

fn is_ignorable(doc: &Document, node: NodeId) -> bool {
    match doc.kind(node) {
        NodeKind::Text(text) | NodeKind::CData(text) => is_blank(text),
        NodeKind::Comment(_) => true,
        _ => false,
    }
}

/// Splits an instruction's children into its leading `xsl:sort` keys and
/// the rest of the content.
fn leading_sorts(doc: &Document, el: NodeId) -> Result<(Vec<SortKey>, Vec<NodeId>), XsltError> {
    let mut sorts = Vec::new();
    let mut rest = Vec::new();
    let mut in_prefix = true;
    for &child in doc.children(el) {
        if in_prefix && is_ignorable(doc, child) {
            continue;
        }
        if in_prefix && is_xslt(doc, child) && local_name(doc, child) == "sort" {
            if let Some(key) = compile_sort_key(doc, child)? {
                sorts.push(key);
            }
            continue;
        }
        in_prefix = false;
        if is_xslt(doc, child) && local_name(doc, child) == "sort" {
            log::error!("xsl:sort must come before other content; key ignored");
            continue;
        }
        rest.push(child);
    }
    Ok((sorts, rest))
}

fn compile_sort_key(doc: &Document, el: NodeId) -> Result<Option<SortKey>, XsltError> {
    // The key can come from the select attribute or the element content.
    let select_src = match attr(doc, el, "select") {
        Some(s) => s,
        None => doc.string_value(el),
    };
    if select_src.trim().is_empty() {
        log::error!("xsl:sort: no select expression");
        return Ok(None);
    }

    let numeric = match attr(doc, el, "data-type").as_deref() {
        None | Some("text") => false,
        Some("number") => true,
        Some(other) => {
            log::error!("xsl:sort: unsupported data-type '{}'", other);
            return Ok(None);
        }
    };
    let descending = match attr(doc, el, "order").as_deref() {
        None | Some("ascending") => false,
        Some("descending") => true,
        Some(other) => {
            log::error!("xsl:sort: invalid order '{}'", other);
            return Ok(None);
        }
    };
    if attr(doc, el, "lang").is_some() || attr(doc, el, "case-order").is_some() {
        log::warn!("xsl:sort: lang and case-order are not implemented");
    }

    Ok(Some(SortKey { select: parse_expression(&select_src)?, numeric, descending }))
}

fn compile_instruction(doc: &Document, el: NodeId) -> Result<Option<Instruction>, XsltError> {
    let local = local_name(doc, el).to_string();
    match local.as_str() {
        "apply-templates" => {
            let select = parse_select(attr(doc, el, "select"))?;
            let mode = attr(doc, el, "mode");
            let (sorts, rest) = leading_sorts(doc, el)?;
            for &child in &rest {
                if !is_ignorable(doc, child) {
                    log::warn!(
                        "xsl:apply-templates: child <{}> is ignored",
                        element_name(doc, child)
                    );
                }
            }
            Ok(Some(Instruction::ApplyTemplates { select, mode, sorts }))
        }
        "call-template" => {
            let Some(name) = required_attr(doc, el, "name", "xsl:call-template") else {
                return Ok(None);
            };
            let (local, ns_uri) = resolve_qname(doc, el, &name);
            let mut params = Vec::new();
            for &child in doc.children(el) {
                if is_ignorable(doc, child) {
                    continue;
                }
                if is_xslt(doc, child) && local_name(doc, child) == "with-param" {
                    let Some(p_name) = required_attr(doc, child, "name", "xsl:with-param") else {
                        continue;
                    };
                    let Some(select) = required_attr(doc, child, "select", "xsl:with-param")
                    else {
                        continue;
                    };
                    params.push(WithParam { name: p_name, select: parse_expression(&select)? });
                } else {
                    log::error!(
                        "xsl:call-template: misplaced <{}> element",
                        element_name(doc, child)
                    );
                }
            }
            Ok(Some(Instruction::CallTemplate { local, ns_uri, params }))
        }
        "for-each" => {
            let Some(select) = required_attr(doc, el, "select", "xsl:for-each") else {
                return Ok(None);
            };
            let (sorts, rest) = leading_sorts(doc, el)?;
            let body = compile_nodes(doc, &rest)?;
            Ok(Some(Instruction::ForEach { select: parse_expression(&select)?, sorts, body }))
        }
        "if" => {
            let Some(test) = required_attr(doc, el, "test", "xsl:if") else {
                return Ok(None);
            };
            let body = compile_nodes(doc, doc.children(el))?;
            Ok(Some(Instruction::If { test: parse_expression(&test)?, body }))
        }
        "choose" => {
            let mut whens = Vec::new();
            let mut otherwise = None;
            for &child in doc.children(el) {
                if is_ignorable(doc, child) {
                    continue;
                }
                match (is_xslt(doc, child), local_name(doc, child)) {
                    (true, "when") => {
                        let Some(test) = required_attr(doc, child, "test", "xsl:when") else {
                            continue;
                        };
                        whens.push(When {
                            test: parse_expression(&test)?,
                            body: compile_nodes(doc, doc.children(child))?,
                        });
                    }
                    (true, "otherwise") => {
                        otherwise = Some(compile_nodes(doc, doc.children(child))?);
                    }
                    _ => log::error!(
                        "xsl:choose: misplaced <{}> element",
                        element_name(doc, child)
                    ),
                }
            }
            Ok(Some(Instruction::Choose { whens, otherwise }))
        }
        "value-of" => {
            let Some(select) = required_attr(doc, el, "select", "xsl:value-of") else {
                return Ok(None);
            };
            let disable_escaping = match attr(doc, el, "disable-output-escaping").as_deref() {
                None | Some("no") => false,
                Some("yes") => true,
                Some(other) => {
                    log::error!("xsl:value-of: invalid disable-output-escaping '{}'", other);
                    return Ok(None);
                }
            };
            Ok(Some(Instruction::ValueOf { select: parse_expression(&select)?, disable_escaping }))
        }
        "attribute" => {
            let Some(name) = required_attr(doc, el, "name", "xsl:attribute") else {
                return Ok(None);
            };
            let name = match Avt::parse(&name) {
                Ok(avt) => avt,
                Err(e) => {
                    log::error!("xsl:attribute: {}", e);
                    return Ok(None);
                }
            };
            Ok(Some(Instruction::Attribute {
                name,
                has_namespace_attr: attr(doc, el, "namespace").is_some(),
                body: compile_nodes(doc, doc.children(el))?,
            }))
        }
        "comment" => Ok(Some(Instruction::Comment {
            body: compile_nodes(doc, doc.children(el))?,
        })),
        "processing-instruction" => {
            let Some(name) = required_attr(doc, el, "name", "xsl:processing-instruction") else {
                return Ok(None);
            };
            let name = match Avt::parse(&name) {
                Ok(avt) => avt,
                Err(e) => {
                    log::error!("xsl:processing-instruction: {}", e);
                    return Ok(None);
                }
            };
            Ok(Some(Instruction::ProcessingInstruction {
                name,
                body: compile_nodes(doc, doc.children(el))?,
            }))
        }
        "variable" | "param" => {
            let which = if local == "param" { "xsl:param" } else { "xsl:variable" };
            let Some(name) = required_attr(doc, el, "name", which) else {
                return Ok(None);
            };
            let select = parse_select(attr(doc, el, "select"))?;
            if select.is_none() && doc.children(el).iter().any(|&c| !is_ignorable(doc, c)) {
                log::warn!("{} '{}': content bodies are not supported, the value is empty", which, name);
            }
            Ok(Some(if local == "param" {
                Instruction::Param { name, select }
            } else {
                Instruction::Variable { name, select }
            }))
        }
        "text" => {
            let mut content = String::new();
            for &child in doc.children(el) {
                if let NodeKind::Text(text) | NodeKind::CData(text) = doc.kind(child) {
                    content.push_str(text);
                }
            }
            Ok(Some(Instruction::Text(content)))
        }
        "message" => Ok(Some(Instruction::Message {
            body: compile_nodes(doc, doc.children(el))?,
        })),
        "sort" | "with-param" => {
            log::error!("misplaced xsl:{} element", local);
            Ok(None)
        }
        other => {
            log::error!("unrecognized instruction xsl:{}", other);
            Ok(None)
        }
    }
}
