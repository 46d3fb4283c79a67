//! Evaluation of parsed expressions against a document.

use crate::ast::{Axis, BinaryOperator, Expression, KindTest, LocationPath, NodeTest, Step};
use crate::error::XPathError;
use crate::functions;
use folio_dom::{Document, NodeId, NodeKind};
use std::collections::HashSet;

/// The four XPath 1.0 value kinds.
#[derive(Debug, Clone)]
pub enum Value {
    NodeSet(Vec<NodeId>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn empty_string() -> Value {
        Value::String(String::new())
    }

    /// `boolean()` coercion.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    /// `number()` coercion. Needs the document for node-set operands.
    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::String(s) => str_to_number(s),
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::NodeSet(nodes) => match nodes.first() {
                Some(&n) => str_to_number(&doc.string_value(n)),
                None => f64::NAN,
            },
        }
    }

    /// `string()` coercion: a node-set converts to the string value of its
    /// first node in document order.
    pub fn string_value(&self, doc: &Document) -> String {
        match self {
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|&n| doc.string_value(n))
                .unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => number_to_string(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }
}

pub(crate) fn str_to_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

/// XPath 1.0 number formatting: integral values print without a fraction,
/// non-numbers print as `NaN`/`Infinity`.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{}", n)
    }
}

/// Lookup hook consulted for `$name` references.
pub trait VariableResolver {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Everything an evaluation needs: the document, the context node, the
/// context size and 1-based proximity position, and the variable hook.
pub struct EvalContext<'d> {
    pub doc: &'d Document,
    pub node: NodeId,
    pub position: usize,
    pub size: usize,
    pub variables: Option<&'d dyn VariableResolver>,
}

impl<'d> EvalContext<'d> {
    pub fn new(doc: &'d Document, node: NodeId) -> Self {
        EvalContext { doc, node, position: 1, size: 1, variables: None }
    }

    fn at(&self, node: NodeId, position: usize, size: usize) -> EvalContext<'d> {
        EvalContext { doc: self.doc, node, position, size, variables: self.variables }
    }
}

/// Evaluates a parsed expression in the given context.
pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    match expr {
        Expression::Literal(s) => Ok(Value::String(s.clone())),
        Expression::Number(n) => Ok(Value::Number(*n)),
        Expression::Variable(name) => match ctx.variables.and_then(|v| v.lookup(name)) {
            Some(value) => Ok(value),
            None => {
                log::warn!("reference to undeclared variable ${}", name);
                Ok(Value::empty_string())
            }
        },
        Expression::Path(path) => Ok(Value::NodeSet(eval_location_path(path, ctx)?)),
        Expression::FunctionCall { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, ctx)?);
            }
            functions::evaluate_function(name, evaluated, ctx)
        }
        Expression::Binary { left, op, right } => eval_binary(*op, left, right, ctx),
        Expression::Negate(inner) => {
            let value = evaluate(inner, ctx)?;
            Ok(Value::Number(-value.to_number(ctx.doc)))
        }
    }
}

fn eval_binary(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    ctx: &EvalContext<'_>,
) -> Result<Value, XPathError> {
    use BinaryOperator::*;

    // `or`/`and` short-circuit on the left operand.
    if op == Or {
        let l = evaluate(left, ctx)?;
        if l.to_bool() {
            return Ok(Value::Boolean(true));
        }
        return Ok(Value::Boolean(evaluate(right, ctx)?.to_bool()));
    }
    if op == And {
        let l = evaluate(left, ctx)?;
        if !l.to_bool() {
            return Ok(Value::Boolean(false));
        }
        return Ok(Value::Boolean(evaluate(right, ctx)?.to_bool()));
    }

    let l = evaluate(left, ctx)?;
    let r = evaluate(right, ctx)?;
    match op {
        Union => {
            let (Value::NodeSet(a), Value::NodeSet(b)) = (&l, &r) else {
                return Err(XPathError::Type(
                    "operands of | must be node-sets".to_string(),
                ));
            };
            let mut merged: Vec<NodeId> = a.clone();
            let seen: HashSet<NodeId> = a.iter().copied().collect();
            merged.extend(b.iter().copied().filter(|n| !seen.contains(n)));
            merged.sort();
            Ok(Value::NodeSet(merged))
        }
        Equals | NotEquals | Less | LessOrEqual | Greater | GreaterOrEqual => {
            Ok(Value::Boolean(compare(op, &l, &r, ctx.doc)))
        }
        Add => Ok(Value::Number(l.to_number(ctx.doc) + r.to_number(ctx.doc))),
        Subtract => Ok(Value::Number(l.to_number(ctx.doc) - r.to_number(ctx.doc))),
        Multiply => Ok(Value::Number(l.to_number(ctx.doc) * r.to_number(ctx.doc))),
        Divide => Ok(Value::Number(l.to_number(ctx.doc) / r.to_number(ctx.doc))),
        Modulo => Ok(Value::Number(l.to_number(ctx.doc) % r.to_number(ctx.doc))),
        Or | And => unreachable!("handled above"),
    }
}

/// XPath 1.0 comparison rules, including the existential semantics of
/// node-set operands.
fn compare(op: BinaryOperator, left: &Value, right: &Value, doc: &Document) -> bool {
    use BinaryOperator::*;

    let cmp_numbers = |a: f64, b: f64| match op {
        Equals => a == b,
        NotEquals => a != b,
        Less => a < b,
        LessOrEqual => a <= b,
        Greater => a > b,
        GreaterOrEqual => a >= b,
        _ => false,
    };
    let relational = matches!(op, Less | LessOrEqual | Greater | GreaterOrEqual);
    let cmp_strings = |a: &str, b: &str| {
        if relational {
            cmp_numbers(str_to_number(a), str_to_number(b))
        } else {
            match op {
                Equals => a == b,
                NotEquals => a != b,
                _ => false,
            }
        }
    };

    match (left, right) {
        (Value::NodeSet(a), Value::NodeSet(b)) => a.iter().any(|&x| {
            let xs = doc.string_value(x);
            b.iter().any(|&y| cmp_strings(&xs, &doc.string_value(y)))
        }),
        (Value::NodeSet(a), Value::Number(n)) => {
            a.iter().any(|&x| cmp_numbers(str_to_number(&doc.string_value(x)), *n))
        }
        (Value::Number(n), Value::NodeSet(b)) => {
            b.iter().any(|&y| cmp_numbers(*n, str_to_number(&doc.string_value(y))))
        }
        (Value::NodeSet(a), Value::String(s)) => {
            a.iter().any(|&x| cmp_strings(&doc.string_value(x), s))
        }
        (Value::String(s), Value::NodeSet(b)) => {
            b.iter().any(|&y| cmp_strings(s, &doc.string_value(y)))
        }
        (Value::NodeSet(_), Value::Boolean(b)) => {
            cmp_numbers(if left.to_bool() { 1.0 } else { 0.0 }, if *b { 1.0 } else { 0.0 })
        }
        (Value::Boolean(b), Value::NodeSet(_)) => {
            cmp_numbers(if *b { 1.0 } else { 0.0 }, if right.to_bool() { 1.0 } else { 0.0 })
        }
        _ => {
            if relational {
                cmp_numbers(left.to_number(doc), right.to_number(doc))
            } else if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                cmp_numbers(
                    if left.to_bool() { 1.0 } else { 0.0 },
                    if right.to_bool() { 1.0 } else { 0.0 },
                )
            } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                cmp_numbers(left.to_number(doc), right.to_number(doc))
            } else {
                cmp_strings(&left.string_value(doc), &right.string_value(doc))
            }
        }
    }
}

// --- Location paths ---

fn eval_location_path(
    path: &LocationPath,
    ctx: &EvalContext<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    let mut current = if let Some(start) = &path.start {
        match evaluate(start, ctx)? {
            Value::NodeSet(nodes) => nodes,
            // A non-node-set start makes the whole path empty.
            _ => return Ok(Vec::new()),
        }
    } else if path.absolute {
        vec![ctx.doc.root()]
    } else {
        vec![ctx.node]
    };

    for step in &path.steps {
        current = eval_step(step, &current, ctx)?;
    }
    Ok(current)
}

fn eval_step(
    step: &Step,
    context_nodes: &[NodeId],
    ctx: &EvalContext<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    let mut seen = HashSet::new();
    let mut collected = Vec::new();
    for &node in context_nodes {
        collect_axis(ctx.doc, step.axis, node, &mut seen, &mut collected);
    }

    let tested: Vec<NodeId> = collected
        .into_iter()
        .filter(|&n| node_test_matches(ctx.doc, step.axis, &step.test, n))
        .collect();

    apply_predicates(&tested, &step.predicates, ctx)
}

fn push(node: NodeId, seen: &mut HashSet<NodeId>, out: &mut Vec<NodeId>) {
    if seen.insert(node) {
        out.push(node);
    }
}

fn collect_axis(
    doc: &Document,
    axis: Axis,
    node: NodeId,
    seen: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    match axis {
        Axis::SelfAxis => push(node, seen, out),
        Axis::Child => {
            for &child in doc.children(node) {
                push(child, seen, out);
            }
        }
        Axis::Attribute => {
            for &attr in doc.attributes(node) {
                push(attr, seen, out);
            }
        }
        Axis::Parent => {
            if let Some(parent) = doc.parent(node) {
                push(parent, seen, out);
            }
        }
        Axis::Ancestor => {
            let mut cur = doc.parent(node);
            while let Some(p) = cur {
                push(p, seen, out);
                cur = doc.parent(p);
            }
        }
        Axis::Descendant => collect_descendants(doc, node, seen, out),
        Axis::DescendantOrSelf => {
            push(node, seen, out);
            collect_descendants(doc, node, seen, out);
        }
        Axis::FollowingSibling => {
            if let Some(parent) = doc.parent(node) {
                let siblings = doc.children(parent);
                let after = siblings.iter().skip_while(|&&s| s != node).skip(1);
                for &s in after {
                    push(s, seen, out);
                }
            }
        }
        Axis::PrecedingSibling => {
            if let Some(parent) = doc.parent(node) {
                for &s in doc.children(parent).iter().take_while(|&&s| s != node) {
                    push(s, seen, out);
                }
            }
        }
        Axis::Following => {
            let mut cur = Some(node);
            while let Some(c) = cur {
                let parent = doc.parent(c);
                if let Some(p) = parent {
                    let after = doc.children(p).iter().skip_while(|&&s| s != c).skip(1);
                    for &s in after {
                        push(s, seen, out);
                        collect_descendants(doc, s, seen, out);
                    }
                }
                cur = parent;
            }
        }
        Axis::Preceding => {
            let mut cur = Some(node);
            while let Some(c) = cur {
                let parent = doc.parent(c);
                if let Some(p) = parent {
                    for &s in doc.children(p).iter().take_while(|&&s| s != c) {
                        push(s, seen, out);
                        collect_descendants(doc, s, seen, out);
                    }
                }
                cur = parent;
            }
        }
    }
}

// Pre-order walk, so results come out in document order.
fn collect_descendants(
    doc: &Document,
    node: NodeId,
    seen: &mut HashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    for &child in doc.children(node) {
        push(child, seen, out);
        collect_descendants(doc, child, seen, out);
    }
}

fn node_test_matches(doc: &Document, axis: Axis, test: &NodeTest, node: NodeId) -> bool {
    let kind = doc.kind(node);
    let principal = match axis {
        Axis::Attribute => matches!(kind, NodeKind::Attribute { .. }),
        _ => matches!(kind, NodeKind::Element { .. }),
    };
    match test {
        NodeTest::Wildcard => principal,
        NodeTest::Name(name) => {
            principal && doc.name(node).map(|q| q.local == *name).unwrap_or(false)
        }
        NodeTest::Kind(KindTest::Text) => kind.is_character_data(),
        NodeTest::Kind(KindTest::Comment) => matches!(kind, NodeKind::Comment(_)),
        NodeTest::Kind(KindTest::ProcessingInstruction) => {
            matches!(kind, NodeKind::ProcessingInstruction { .. })
        }
        NodeTest::Kind(KindTest::Node) => true,
    }
}

fn apply_predicates(
    nodes: &[NodeId],
    predicates: &[Expression],
    ctx: &EvalContext<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    let mut current = nodes.to_vec();
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::new();
        for (i, &node) in current.iter().enumerate() {
            let inner = ctx.at(node, i + 1, size);
            let result = evaluate(predicate, &inner)?;
            let keep = match result {
                // A bare number selects by position.
                Value::Number(n) => n as usize == i + 1,
                other => other.to_bool(),
            };
            if keep {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn sample() -> Document {
        Document::parse(
            r#"<root><para id="p1">Hello</para><!-- note --><div/><?pi data?><para>World</para></root>"#,
        )
        .unwrap()
    }

    fn eval(doc: &Document, expr: &str) -> Value {
        let parsed = parse_expression(expr).unwrap();
        evaluate(&parsed, &EvalContext::new(doc, doc.root())).unwrap()
    }

    fn node_set(v: Value) -> Vec<NodeId> {
        match v {
            Value::NodeSet(nodes) => nodes,
            other => panic!("expected node-set, got {:?}", other),
        }
    }

    #[test]
    fn child_steps_and_names() {
        let doc = sample();
        let paras = node_set(eval(&doc, "root/para"));
        assert_eq!(paras.len(), 2);
        assert_eq!(doc.string_value(paras[0]), "Hello");
        assert_eq!(doc.string_value(paras[1]), "World");
    }

    #[test]
    fn positional_predicates() {
        let doc = sample();
        let first = node_set(eval(&doc, "root/para[1]"));
        assert_eq!(first.len(), 1);
        assert_eq!(doc.string_value(first[0]), "Hello");

        let by_fn = node_set(eval(&doc, "root/para[position()=2]"));
        assert_eq!(doc.string_value(by_fn[0]), "World");

        let by_last = node_set(eval(&doc, "root/para[last()]"));
        assert_eq!(doc.string_value(by_last[0]), "World");
    }

    #[test]
    fn attribute_predicates_and_axis() {
        let doc = sample();
        let by_attr = node_set(eval(&doc, "root/para[@id='p1']"));
        assert_eq!(by_attr.len(), 1);
        assert_eq!(doc.string_value(by_attr[0]), "Hello");

        let attrs = node_set(eval(&doc, "root/para/@id"));
        assert_eq!(attrs.len(), 1);
        assert_eq!(doc.string_value(attrs[0]), "p1");
    }

    #[test]
    fn descendants_in_document_order() {
        let doc = sample();
        let texts = node_set(eval(&doc, "//text()"));
        let values: Vec<String> = texts.iter().map(|&t| doc.string_value(t)).collect();
        assert_eq!(values, vec!["Hello", "World"]);
    }

    #[test]
    fn kind_tests() {
        let doc = sample();
        assert_eq!(node_set(eval(&doc, "root/comment()")).len(), 1);
        assert_eq!(node_set(eval(&doc, "root/processing-instruction()")).len(), 1);
        assert_eq!(node_set(eval(&doc, "root/node()")).len(), 5);
    }

    #[test]
    fn sibling_axes() {
        let doc = sample();
        let after = node_set(eval(&doc, "root/div/following-sibling::para"));
        assert_eq!(after.len(), 1);
        assert_eq!(doc.string_value(after[0]), "World");

        let before = node_set(eval(&doc, "root/div/preceding-sibling::para"));
        assert_eq!(before.len(), 1);
        assert_eq!(doc.string_value(before[0]), "Hello");
    }

    #[test]
    fn parent_and_self() {
        let doc = sample();
        let up = node_set(eval(&doc, "root/para/.."));
        assert_eq!(up.len(), 1);
        assert_eq!(doc.name(up[0]).unwrap().local, "root");

        let selves = node_set(eval(&doc, "root/."));
        assert_eq!(selves.len(), 1);
    }

    #[test]
    fn arithmetic_and_coercions() {
        let doc = Document::parse("<r><a>3</a><b>10</b></r>").unwrap();
        let ctx = EvalContext::new(&doc, doc.root());
        let expr = parse_expression("r/a + r/b").unwrap();
        assert!(matches!(evaluate(&expr, &ctx).unwrap(), Value::Number(n) if n == 13.0));

        let expr = parse_expression("r/b div r/a - 1").unwrap();
        let Value::Number(n) = evaluate(&expr, &ctx).unwrap() else { panic!() };
        assert!((n - (10.0 / 3.0 - 1.0)).abs() < 1e-9);

        let expr = parse_expression("-r/a").unwrap();
        assert!(matches!(evaluate(&expr, &ctx).unwrap(), Value::Number(n) if n == -3.0));
    }

    #[test]
    fn existential_comparison_on_node_sets() {
        let doc = Document::parse("<r><i>1</i><i>2</i></r>").unwrap();
        let ctx = EvalContext::new(&doc, doc.root());
        let hit = parse_expression("r/i = 2").unwrap();
        assert!(evaluate(&hit, &ctx).unwrap().to_bool());
        let miss = parse_expression("r/i = 3").unwrap();
        assert!(!evaluate(&miss, &ctx).unwrap().to_bool());
        let rel = parse_expression("r/i < 2").unwrap();
        assert!(evaluate(&rel, &ctx).unwrap().to_bool());
    }

    #[test]
    fn union_merges_in_document_order() {
        let doc = sample();
        let both = node_set(eval(&doc, "root/div | root/para"));
        assert_eq!(both.len(), 3);
        assert_eq!(doc.string_value(both[0]), "Hello");
        assert_eq!(doc.name(both[1]).unwrap().local, "div");
    }

    struct OneVar(&'static str, Value);
    impl VariableResolver for OneVar {
        fn lookup(&self, name: &str) -> Option<Value> {
            (name == self.0).then(|| self.1.clone())
        }
    }

    #[test]
    fn variables_resolve_through_the_hook() {
        let doc = sample();
        let vars = OneVar("greeting", Value::String("hi".into()));
        let mut ctx = EvalContext::new(&doc, doc.root());
        ctx.variables = Some(&vars);
        let expr = parse_expression("$greeting").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap().string_value(&doc), "hi");

        // Unknown variables evaluate to the empty string rather than failing.
        let expr = parse_expression("$missing").unwrap();
        assert_eq!(evaluate(&expr, &ctx).unwrap().string_value(&doc), "");
    }

    #[test]
    fn path_rooted_in_variable_node_set() {
        let doc = sample();
        let root_el = doc.root_element().unwrap();
        let paras: Vec<NodeId> = doc
            .children(root_el)
            .iter()
            .copied()
            .filter(|&c| doc.name(c).map(|q| q.local == "para").unwrap_or(false))
            .collect();
        let vars = OneVar("paras", Value::NodeSet(paras));
        let mut ctx = EvalContext::new(&doc, doc.root());
        ctx.variables = Some(&vars);
        let expr = parse_expression("$paras/text()").unwrap();
        let Value::NodeSet(texts) = evaluate(&expr, &ctx).unwrap() else { panic!() };
        assert_eq!(texts.len(), 2);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(-2.0), "-2");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
    }

    #[test]
    fn boolean_coercions() {
        let doc = sample();
        assert!(eval(&doc, "root/para").to_bool());
        assert!(!eval(&doc, "root/missing").to_bool());
        assert!(Value::String("x".into()).to_bool());
        assert!(!Value::String(String::new()).to_bool());
        assert!(!Value::Number(f64::NAN).to_bool());
    }

    #[test]
    fn short_circuit_keeps_missing_function_unreached() {
        let doc = sample();
        // The right side would error; `or` must not evaluate it.
        let expr = parse_expression("true() or unknown-fn()").unwrap();
        let ctx = EvalContext::new(&doc, doc.root());
        assert!(evaluate(&expr, &ctx).unwrap().to_bool());
    }
}
