//! The compiled form of a stylesheet: template rules, instruction bodies,
//! and attribute value templates.

use crate::error::XsltError;
use crate::pattern::Pattern;
use folio_dom::{NsDecl, QName};
use folio_xpath1::{Expression, parse_expression};
use std::collections::HashMap;

pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";

/// Where the result goes, from `xsl:output method=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMethod {
    Xml,
    Html,
    Text,
}

impl OutputMethod {
    /// Maps the declared method; anything unrecognized is a fatal error at
    /// the start of a transformation.
    pub fn resolve(spec: &OutputSpec) -> Result<OutputMethod, XsltError> {
        match spec.method.as_deref() {
            None | Some("xml") => Ok(OutputMethod::Xml),
            Some("html") => Ok(OutputMethod::Html),
            Some("text") => Ok(OutputMethod::Text),
            Some(other) => Err(XsltError::UnsupportedOutputMethod(other.to_string())),
        }
    }
}

/// `xsl:output` metadata.
#[derive(Debug, Clone, Default)]
pub struct OutputSpec {
    pub method: Option<String>,
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
}

/// Entry in the whitespace strip/preserve map, keyed by element name or `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacePolicy {
    Strip,
    Preserve,
}

/// A top-level `xsl:variable` or `xsl:param`, evaluated before any template
/// runs.
#[derive(Debug)]
pub struct GlobalDecl {
    pub name: String,
    pub select: Option<Expression>,
    pub is_param: bool,
}

/// One `xsl:template`, compiled.
#[derive(Debug)]
pub struct TemplateRule {
    /// Resolved `(local name, namespace URI)` for named templates.
    pub name: Option<(String, Option<String>)>,
    pub pattern: Option<Pattern>,
    pub mode: Option<String>,
    pub priority: f64,
    pub body: Vec<BodyNode>,
}

/// The whole compiled stylesheet. Read-only during transformation.
#[derive(Debug, Default)]
pub struct CompiledStylesheet {
    pub templates: Vec<TemplateRule>,
    pub strip_space: HashMap<String, SpacePolicy>,
    pub output: OutputSpec,
    pub globals: Vec<GlobalDecl>,
}

impl CompiledStylesheet {
    pub fn named_template(&self, local: &str, ns_uri: Option<&str>) -> Option<&TemplateRule> {
        self.templates.iter().find(|t| {
            t.name
                .as_ref()
                .map(|(l, ns)| l == local && ns.as_deref() == ns_uri)
                .unwrap_or(false)
        })
    }
}

/// One node of a compiled template body, walked in document order.
#[derive(Debug)]
pub enum BodyNode {
    /// Literal text from the stylesheet.
    Text(String),
    /// A stylesheet comment, copied verbatim.
    Comment(String),
    /// A stylesheet processing instruction, copied verbatim.
    Pi { target: String, data: String },
    Element(LiteralElement),
    Instruction(Instruction),
}

/// A literal result element together with its attribute value templates.
#[derive(Debug)]
pub struct LiteralElement {
    pub name: QName,
    pub ns_uri: Option<String>,
    pub ns_decls: Vec<NsDecl>,
    pub attributes: Vec<LiteralAttribute>,
    pub children: Vec<BodyNode>,
}

#[derive(Debug)]
pub struct LiteralAttribute {
    pub name: QName,
    pub ns_uri: Option<String>,
    pub value: Avt,
}

/// The closed family of XSLT instructions the interpreter dispatches on.
#[derive(Debug)]
pub enum Instruction {
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<String>,
        sorts: Vec<SortKey>,
    },
    CallTemplate {
        local: String,
        ns_uri: Option<String>,
        params: Vec<WithParam>,
    },
    ForEach {
        select: Expression,
        sorts: Vec<SortKey>,
        body: Vec<BodyNode>,
    },
    If {
        test: Expression,
        body: Vec<BodyNode>,
    },
    Choose {
        whens: Vec<When>,
        otherwise: Option<Vec<BodyNode>>,
    },
    ValueOf {
        select: Expression,
        disable_escaping: bool,
    },
    Attribute {
        name: Avt,
        /// `namespace=` is recognized but not implemented.
        has_namespace_attr: bool,
        body: Vec<BodyNode>,
    },
    Comment {
        body: Vec<BodyNode>,
    },
    ProcessingInstruction {
        name: Avt,
        body: Vec<BodyNode>,
    },
    Variable {
        name: String,
        select: Option<Expression>,
    },
    Param {
        name: String,
        select: Option<Expression>,
    },
    /// `xsl:text` content, kept verbatim.
    Text(String),
    Message {
        body: Vec<BodyNode>,
    },
}

#[derive(Debug)]
pub struct When {
    pub test: Expression,
    pub body: Vec<BodyNode>,
}

#[derive(Debug)]
pub struct WithParam {
    pub name: String,
    pub select: Expression,
}

/// One `xsl:sort` key.
#[derive(Debug)]
pub struct SortKey {
    pub select: Expression,
    /// `data-type="number"`.
    pub numeric: bool,
    /// `order="descending"`.
    pub descending: bool,
}

/// An attribute value template: literal runs interleaved with `{expr}`
/// fragments.
#[derive(Debug)]
pub struct Avt {
    pub parts: Vec<AvtPart>,
}

#[derive(Debug)]
pub enum AvtPart {
    Literal(String),
    Expr(Expression),
}

impl Avt {
    pub fn parse(input: &str) -> Result<Avt, XsltError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    if !literal.is_empty() {
                        parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                    }
                    let mut expr_src = String::new();
                    let mut quote: Option<char> = None;
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match quote {
                            Some(q) if c == q => quote = None,
                            None if c == '\'' || c == '"' => quote = Some(c),
                            None if c == '}' => {
                                closed = true;
                                break;
                            }
                            _ => {}
                        }
                        expr_src.push(c);
                    }
                    if !closed {
                        return Err(XsltError::Compile(format!(
                            "unterminated expression in attribute value template '{}'",
                            input
                        )));
                    }
                    parts.push(AvtPart::Expr(parse_expression(&expr_src)?));
                }
                '}' => {
                    return Err(XsltError::Compile(format!(
                        "unbalanced '}}' in attribute value template '{}'",
                        input
                    )));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Literal(literal));
        }
        Ok(Avt { parts })
    }
}
