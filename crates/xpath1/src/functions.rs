//! The XPath 1.0 core function library.

use crate::engine::{EvalContext, Value, number_to_string, str_to_number};
use crate::error::XPathError;
use folio_dom::{Document, NodeKind};

fn wrong_arity(name: &str, expected: &str) -> XPathError {
    XPathError::Function {
        function: name.to_string(),
        message: format!("expected {} argument(s)", expected),
    }
}

/// Dispatches a call by function name. Arguments arrive already evaluated.
pub fn evaluate_function(
    name: &str,
    args: Vec<Value>,
    ctx: &EvalContext<'_>,
) -> Result<Value, XPathError> {
    match name {
        // Node-set
        "position" => Ok(Value::Number(ctx.position as f64)),
        "last" => Ok(Value::Number(ctx.size as f64)),
        "count" => func_count(args),
        "name" => func_name(args, ctx, true),
        "local-name" => func_name(args, ctx, false),

        // String
        "string" => func_string(args, ctx),
        "concat" => func_concat(args, ctx.doc),
        "contains" => func_contains(args, ctx.doc),
        "starts-with" => func_starts_with(args, ctx.doc),
        "substring" => func_substring(args, ctx.doc),
        "substring-before" => func_substring_before(args, ctx.doc),
        "substring-after" => func_substring_after(args, ctx.doc),
        "string-length" => func_string_length(args, ctx),
        "normalize-space" => func_normalize_space(args, ctx),
        "translate" => func_translate(args, ctx.doc),

        // Boolean
        "boolean" => func_boolean(args),
        "not" => func_not(args),
        "true" => Ok(Value::Boolean(true)),
        "false" => Ok(Value::Boolean(false)),

        // Number
        "number" => func_number(args, ctx),
        "sum" => func_sum(args, ctx.doc),
        "floor" => func_round_like(args, ctx.doc, "floor", f64::floor),
        "ceiling" => func_round_like(args, ctx.doc, "ceiling", f64::ceil),
        "round" => func_round_like(args, ctx.doc, "round", xpath_round),
        _ => Err(XPathError::Function {
            function: name.to_string(),
            message: "unknown XPath function".to_string(),
        }),
    }
}

// round(x) is floor(x + 0.5), which differs from Rust's round for
// negative halves.
fn xpath_round(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn func_count(mut args: Vec<Value>) -> Result<Value, XPathError> {
    if args.len() != 1 {
        return Err(wrong_arity("count", "1"));
    }
    match args.remove(0) {
        Value::NodeSet(nodes) => Ok(Value::Number(nodes.len() as f64)),
        other => Err(XPathError::Type(format!(
            "count() argument must be a node-set, got {:?}",
            other
        ))),
    }
}

/// `name()` and `local-name()`; the `qualified` flag selects the form.
fn func_name(
    mut args: Vec<Value>,
    ctx: &EvalContext<'_>,
    qualified: bool,
) -> Result<Value, XPathError> {
    let which = if qualified { "name" } else { "local-name" };
    let node = match args.len() {
        0 => Some(ctx.node),
        1 => match args.remove(0) {
            Value::NodeSet(nodes) => nodes.first().copied(),
            other => {
                return Err(XPathError::Type(format!(
                    "{}() argument must be a node-set, got {:?}",
                    which, other
                )));
            }
        },
        _ => return Err(wrong_arity(which, "0 or 1")),
    };
    let Some(node) = node else {
        return Ok(Value::empty_string());
    };
    let name = match ctx.doc.kind(node) {
        NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => {
            if qualified { name.to_string() } else { name.local.clone() }
        }
        NodeKind::ProcessingInstruction { target, .. } => target.clone(),
        _ => String::new(),
    };
    Ok(Value::String(name))
}

fn func_string(mut args: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    match args.len() {
        0 => Ok(Value::String(ctx.doc.string_value(ctx.node))),
        1 => Ok(Value::String(args.remove(0).string_value(ctx.doc))),
        _ => Err(wrong_arity("string", "0 or 1")),
    }
}

fn func_concat(args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    if args.len() < 2 {
        return Err(wrong_arity("concat", "2 or more"));
    }
    let joined: String = args.iter().map(|a| a.string_value(doc)).collect();
    Ok(Value::String(joined))
}

fn two_strings(
    name: &str,
    mut args: Vec<Value>,
    doc: &Document,
) -> Result<(String, String), XPathError> {
    if args.len() != 2 {
        return Err(wrong_arity(name, "2"));
    }
    let second = args.remove(1).string_value(doc);
    let first = args.remove(0).string_value(doc);
    Ok((first, second))
}

fn func_contains(args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    let (haystack, needle) = two_strings("contains", args, doc)?;
    Ok(Value::Boolean(haystack.contains(&needle)))
}

fn func_starts_with(args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    let (haystack, prefix) = two_strings("starts-with", args, doc)?;
    Ok(Value::Boolean(haystack.starts_with(&prefix)))
}

fn func_substring_before(args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    let (s, sep) = two_strings("substring-before", args, doc)?;
    Ok(Value::String(
        s.split_once(&sep).map(|(before, _)| before.to_string()).unwrap_or_default(),
    ))
}

fn func_substring_after(args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    let (s, sep) = two_strings("substring-after", args, doc)?;
    Ok(Value::String(
        s.split_once(&sep).map(|(_, after)| after.to_string()).unwrap_or_default(),
    ))
}

/// `substring(str, start[, length])` with XPath's rounding and 1-based
/// character positions.
fn func_substring(mut args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    if args.len() != 2 && args.len() != 3 {
        return Err(wrong_arity("substring", "2 or 3"));
    }
    let length = if args.len() == 3 {
        Some(args.remove(2).to_number(doc))
    } else {
        None
    };
    let start = args.remove(1).to_number(doc);
    let s = args.remove(0).string_value(doc);

    if start.is_nan() {
        return Ok(Value::empty_string());
    }
    let begin = xpath_round(start);
    let end = match length {
        Some(len) if len.is_nan() => return Ok(Value::empty_string()),
        Some(len) => begin + xpath_round(len),
        None => f64::INFINITY,
    };
    let out: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (i + 1) as f64;
            pos >= begin && pos < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Value::String(out))
}

fn func_string_length(mut args: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    let s = match args.len() {
        0 => ctx.doc.string_value(ctx.node),
        1 => args.remove(0).string_value(ctx.doc),
        _ => return Err(wrong_arity("string-length", "0 or 1")),
    };
    Ok(Value::Number(s.chars().count() as f64))
}

fn func_normalize_space(mut args: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    let s = match args.len() {
        0 => ctx.doc.string_value(ctx.node),
        1 => args.remove(0).string_value(ctx.doc),
        _ => return Err(wrong_arity("normalize-space", "0 or 1")),
    };
    Ok(Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
}

fn func_translate(mut args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    if args.len() != 3 {
        return Err(wrong_arity("translate", "3"));
    }
    let to: Vec<char> = args.remove(2).string_value(doc).chars().collect();
    let from: Vec<char> = args.remove(1).string_value(doc).chars().collect();
    let s = args.remove(0).string_value(doc);

    let out: String = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(Value::String(out))
}

fn func_boolean(mut args: Vec<Value>) -> Result<Value, XPathError> {
    if args.len() != 1 {
        return Err(wrong_arity("boolean", "1"));
    }
    Ok(Value::Boolean(args.remove(0).to_bool()))
}

fn func_not(mut args: Vec<Value>) -> Result<Value, XPathError> {
    if args.len() != 1 {
        return Err(wrong_arity("not", "1"));
    }
    Ok(Value::Boolean(!args.remove(0).to_bool()))
}

fn func_number(mut args: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    let n = match args.len() {
        0 => str_to_number(&ctx.doc.string_value(ctx.node)),
        1 => args.remove(0).to_number(ctx.doc),
        _ => return Err(wrong_arity("number", "0 or 1")),
    };
    Ok(Value::Number(n))
}

fn func_sum(mut args: Vec<Value>, doc: &Document) -> Result<Value, XPathError> {
    if args.len() != 1 {
        return Err(wrong_arity("sum", "1"));
    }
    match args.remove(0) {
        Value::NodeSet(nodes) => {
            let total: f64 = nodes.iter().map(|&n| str_to_number(&doc.string_value(n))).sum();
            Ok(Value::Number(total))
        }
        other => Err(XPathError::Type(format!(
            "sum() argument must be a node-set, got {:?}",
            other
        ))),
    }
}

fn func_round_like(
    mut args: Vec<Value>,
    doc: &Document,
    name: &str,
    op: fn(f64) -> f64,
) -> Result<Value, XPathError> {
    if args.len() != 1 {
        return Err(wrong_arity(name, "1"));
    }
    Ok(Value::Number(op(args.remove(0).to_number(doc))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluate;
    use crate::parser::parse_expression;

    fn eval(doc: &Document, expr: &str) -> Value {
        let parsed = parse_expression(expr).unwrap();
        evaluate(&parsed, &EvalContext::new(doc, doc.root())).unwrap()
    }

    fn eval_str(doc: &Document, expr: &str) -> String {
        eval(doc, expr).string_value(doc)
    }

    #[test]
    fn string_functions() {
        let doc = Document::parse("<r>abc</r>").unwrap();
        assert_eq!(eval_str(&doc, "concat('a', 'b', 'c')"), "abc");
        assert!(eval(&doc, "contains(r, 'b')").to_bool());
        assert!(eval(&doc, "starts-with(r, 'ab')").to_bool());
        assert_eq!(eval_str(&doc, "substring-before('a=b', '=')"), "a");
        assert_eq!(eval_str(&doc, "substring-after('a=b', '=')"), "b");
        assert_eq!(eval_str(&doc, "translate('bar', 'abc', 'ABC')"), "BAr");
        assert_eq!(eval_str(&doc, "translate('-x-', '-', '')"), "x");
        assert_eq!(eval_str(&doc, "normalize-space('  a   b ')"), "a b");
        assert!(matches!(eval(&doc, "string-length('abcd')"), Value::Number(n) if n == 4.0));
    }

    #[test]
    fn substring_rounding_rules() {
        let doc = Document::parse("<r/>").unwrap();
        assert_eq!(eval_str(&doc, "substring('12345', 2, 3)"), "234");
        assert_eq!(eval_str(&doc, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval_str(&doc, "substring('12345', 0, 3)"), "12");
        assert_eq!(eval_str(&doc, "substring('12345', 2)"), "2345");
    }

    #[test]
    fn numeric_functions() {
        let doc = Document::parse("<r><i>1</i><i>2.5</i></r>").unwrap();
        assert!(matches!(eval(&doc, "sum(r/i)"), Value::Number(n) if n == 3.5));
        assert!(matches!(eval(&doc, "floor(1.9)"), Value::Number(n) if n == 1.0));
        assert!(matches!(eval(&doc, "ceiling(1.1)"), Value::Number(n) if n == 2.0));
        assert!(matches!(eval(&doc, "round(2.5)"), Value::Number(n) if n == 3.0));
        assert!(matches!(eval(&doc, "round(-2.5)"), Value::Number(n) if n == -2.0));
        assert!(matches!(eval(&doc, "number('7')"), Value::Number(n) if n == 7.0));
        assert!(matches!(eval(&doc, "number('x')"), Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn boolean_functions() {
        let doc = Document::parse("<r/>").unwrap();
        assert!(eval(&doc, "true()").to_bool());
        assert!(!eval(&doc, "false()").to_bool());
        assert!(eval(&doc, "not(false())").to_bool());
        assert!(eval(&doc, "boolean('x')").to_bool());
        assert!(!eval(&doc, "boolean('')").to_bool());
    }

    #[test]
    fn name_functions() {
        let doc = Document::parse(r#"<r xmlns:p="urn:x"><p:a/></r>"#).unwrap();
        assert_eq!(eval_str(&doc, "name(r)"), "r");
        assert_eq!(eval_str(&doc, "name(r/*)"), "p:a");
        assert_eq!(eval_str(&doc, "local-name(r/*)"), "a");
        // With no argument, the context node's name; the document node has none.
        assert_eq!(eval_str(&doc, "name()"), "");
    }

    #[test]
    fn count_and_string() {
        let doc = Document::parse("<r><i/><i/></r>").unwrap();
        assert!(matches!(eval(&doc, "count(r/i)"), Value::Number(n) if n == 2.0));
        assert_eq!(eval_str(&doc, "string(1.0)"), "1");
        assert_eq!(eval_str(&doc, "string(r/i)"), "");
    }

    #[test]
    fn arity_and_type_errors() {
        let doc = Document::parse("<r/>").unwrap();
        let ctx = EvalContext::new(&doc, doc.root());
        for bad in ["count()", "count('x')", "not()", "substring('x')", "nosuchfn()"] {
            let parsed = parse_expression(bad).unwrap();
            assert!(evaluate(&parsed, &ctx).is_err(), "{} should fail", bad);
        }
    }
}
