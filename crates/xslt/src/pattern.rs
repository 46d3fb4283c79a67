//! Match patterns: the grammar, the matcher, and best-template selection.

use crate::ast::{CompiledStylesheet, TemplateRule};
use crate::error::XsltError;
use folio_dom::{Document, NodeId, NodeKind};
use folio_xpath1::ast::{KindTest, NodeTest};
use folio_xpath1::parser::node_test;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::combinator::map;
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::preceded;
use std::fmt;

/// A compiled match pattern: a union of location-path patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    paths: Vec<PathPattern>,
    source: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One branch of a union, e.g. `doc/section/para` or `/`.
#[derive(Debug, Clone, PartialEq)]
struct PathPattern {
    absolute: bool,
    steps: Vec<PatternStep>,
}

#[derive(Debug, Clone, PartialEq)]
struct PatternStep {
    axis: PatternAxis,
    test: NodeTest,
}

/// Only these two axes occur in match patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternAxis {
    Child,
    Attribute,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Pattern, XsltError> {
        match pattern_paths(text.trim()) {
            Ok(("", paths)) => Ok(Pattern { paths, source: text.to_string() }),
            Ok((rest, _)) => Err(XsltError::PatternParse(
                text.to_string(),
                format!("unconsumed input: '{}'", rest),
            )),
            Err(e) => Err(XsltError::PatternParse(text.to_string(), e.to_string())),
        }
    }

    /// Whether `node` matches any branch of the pattern.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.paths.iter().any(|p| p.matches(doc, node))
    }

    /// The XSLT 1.0 default priority, used when the rule declares none.
    /// A union takes the maximum over its branches.
    pub fn default_priority(&self) -> f64 {
        self.paths
            .iter()
            .map(PathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl PathPattern {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if self.absolute && self.steps.is_empty() {
            // The pattern "/".
            return node == doc.root();
        }

        // Steps are checked right to left, walking up the parent chain.
        let mut current = Some(node);
        for step in self.steps.iter().rev() {
            match current {
                Some(n) if step.matches(doc, n) => current = doc.parent(n),
                _ => return false,
            }
        }

        if self.absolute {
            current == Some(doc.root())
        } else {
            true
        }
    }

    fn default_priority(&self) -> f64 {
        if self.absolute || self.steps.len() != 1 {
            return 0.5;
        }
        match &self.steps[0].test {
            NodeTest::Name(_) => 0.0,
            NodeTest::Wildcard | NodeTest::Kind(_) => -0.5,
        }
    }
}

impl PatternStep {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let kind = doc.kind(node);
        match self.axis {
            PatternAxis::Attribute => {
                if !matches!(kind, NodeKind::Attribute { .. }) {
                    return false;
                }
            }
            PatternAxis::Child => {
                // The child axis in a pattern can face elements, character
                // data, and the root.
                if !matches!(
                    kind,
                    NodeKind::Element { .. }
                        | NodeKind::Text(_)
                        | NodeKind::CData(_)
                        | NodeKind::Document { .. }
                ) {
                    return false;
                }
            }
        }

        match &self.test {
            NodeTest::Wildcard => match self.axis {
                // `*` on the child axis matches only elements.
                PatternAxis::Child => matches!(kind, NodeKind::Element { .. }),
                PatternAxis::Attribute => true,
            },
            NodeTest::Name(name) => doc.name(node).map(|q| q.local == *name).unwrap_or(false),
            NodeTest::Kind(KindTest::Text) => kind.is_character_data(),
            NodeTest::Kind(KindTest::Comment) => matches!(kind, NodeKind::Comment(_)),
            NodeTest::Kind(KindTest::ProcessingInstruction) => {
                matches!(kind, NodeKind::ProcessingInstruction { .. })
            }
            NodeTest::Kind(KindTest::Node) => true,
        }
    }
}

// --- Grammar ---

fn pattern_step(input: &str) -> IResult<&str, PatternStep> {
    alt((
        map(preceded(tag("@"), node_test), |t| PatternStep {
            axis: PatternAxis::Attribute,
            test: t,
        }),
        map(node_test, |t| PatternStep { axis: PatternAxis::Child, test: t }),
    ))(input)
}

fn path_pattern(input: &str) -> IResult<&str, PathPattern> {
    let (rest, absolute) = match tag::<&str, &str, nom::error::Error<&str>>("/")(input) {
        Ok((rest, _)) => (rest, true),
        Err(_) => (input, false),
    };
    let (rest, steps) = if absolute {
        // `/` alone is valid, as are `/doc` and `/doc/part`.
        separated_list0(tag("/"), pattern_step)(rest)?
    } else {
        separated_list1(tag("/"), pattern_step)(rest)?
    };
    Ok((rest, PathPattern { absolute, steps }))
}

fn pattern_paths(input: &str) -> IResult<&str, Vec<PathPattern>> {
    separated_list1(tag("|"), path_pattern)(input)
}

// --- Template selection ---

/// Returns the best rule matching `node` in `mode`: highest priority wins,
/// and among equal priorities the rule declared last in the stylesheet.
pub fn find_template<'s>(
    style: &'s CompiledStylesheet,
    doc: &Document,
    node: NodeId,
    mode: Option<&str>,
) -> Option<&'s TemplateRule> {
    let mut best: Option<&TemplateRule> = None;
    for rule in &style.templates {
        if rule.mode.as_deref() != mode {
            continue;
        }
        let Some(pattern) = &rule.pattern else { continue };
        if !pattern.matches(doc, node) {
            continue;
        }
        match best {
            Some(b) if rule.priority < b.priority => {}
            _ => best = Some(rule),
        }
    }
    best
}
