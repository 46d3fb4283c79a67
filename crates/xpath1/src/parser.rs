//! A `nom`-based parser for the XPath 1.0 expression grammar.

use crate::ast::{Axis, BinaryOperator, Expression, KindTest, LocationPath, NodeTest, Step};
use crate::error::XPathError;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, opt, peek, recognize};
use nom::multi::{many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded, terminated};

/// Parses a complete expression. The result is reusable: parse once,
/// evaluate per context.
pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => Err(XPathError::Parse(
            input.to_string(),
            format!("unconsumed input: '{}'", rest),
        )),
        Err(e) => Err(XPathError::Parse(input.to_string(), e.to_string())),
    }
}

// --- Helpers ---

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Left-associative chain of a sub-expression parser and an operator parser.
fn binary_chain<'a>(
    sub: fn(&'a str) -> IResult<&'a str, Expression>,
    op: fn(&'a str) -> IResult<&'a str, BinaryOperator>,
) -> impl FnMut(&'a str) -> IResult<&'a str, Expression> {
    move |input: &'a str| {
        let (input, first) = sub(input)?;
        let (input, rest) = many0(pair(ws(op), sub))(input)?;
        let expr = rest.into_iter().fold(first, |left, (op, right)| Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
        Ok((input, expr))
    }
}

// --- Expression levels, loosest binding first ---

fn expression(input: &str) -> IResult<&str, Expression> {
    or_expr(input)
}

fn or_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(tag("or"), |_| BinaryOperator::Or)(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(tag("and"), |_| BinaryOperator::And)(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(tag("!="), |_| BinaryOperator::NotEquals),
        map(tag("="), |_| BinaryOperator::Equals),
    ))(input)
}

fn relational_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(tag("<="), |_| BinaryOperator::LessOrEqual),
        map(tag(">="), |_| BinaryOperator::GreaterOrEqual),
        map(tag("<"), |_| BinaryOperator::Less),
        map(tag(">"), |_| BinaryOperator::Greater),
    ))(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('+'), |_| BinaryOperator::Add),
        map(char('-'), |_| BinaryOperator::Subtract),
    ))(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('*'), |_| BinaryOperator::Multiply),
        map(tag("div"), |_| BinaryOperator::Divide),
        map(tag("mod"), |_| BinaryOperator::Modulo),
    ))(input)
}

fn union_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(char('|'), |_| BinaryOperator::Union)(input)
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(and_expr, or_op)(input)
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(equality_expr, and_op)(input)
}

fn equality_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(relational_expr, equality_op)(input)
}

fn relational_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(additive_expr, relational_op)(input)
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(multiplicative_expr, additive_op)(input)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(unary_expr, multiplicative_op)(input)
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (i, minus) = opt(ws(char('-')))(input)?;
    let (i, expr) = union_expr(i)?;
    if minus.is_some() {
        Ok((i, Expression::Negate(Box::new(expr))))
    } else {
        Ok((i, expr))
    }
}

// `|` binds tighter than the arithmetic operators but only joins paths.
fn union_expr(input: &str) -> IResult<&str, Expression> {
    binary_chain(path_expr, union_op)(input)
}

/// Handles the overlap between location paths and primary expressions that
/// continue as a path (`$var/foo`, `(..)/bar`). Primaries go first so a
/// call like `position()` is not half-parsed as a step named `position`.
fn path_expr(input: &str) -> IResult<&str, Expression> {
    let (i, head) = alt((primary_expr, map(location_path, Expression::Path)))(input)?;
    let (i, trailing) = many0(pair(alt((tag("//"), tag("/"))), step))(i)?;

    if trailing.is_empty() {
        return Ok((i, head));
    }

    let (start, absolute, mut steps) = match head {
        Expression::Path(p) => (p.start, p.absolute, p.steps),
        other => (Some(Box::new(other)), false, Vec::new()),
    };
    for (sep, next) in trailing {
        if sep == "//" {
            steps.push(Step::descendant_or_self_node());
        }
        steps.push(next);
    }
    Ok((i, Expression::Path(LocationPath { start, absolute, steps })))
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        variable_reference,
        function_call,
        map(double, Expression::Number),
        map(string_literal, Expression::Literal),
        delimited(ws(char('(')), expression, ws(char(')'))),
    )))(input)
}

// --- Tokens ---

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )(input)
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), q_name), Expression::Variable)(input)
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.'),
    ))(input)
}

fn q_name(input: &str) -> IResult<&str, String> {
    map(recognize(pair(nc_name, opt(pair(tag(":"), nc_name)))), |s: &str| {
        s.to_string()
    })(input)
}

fn kind_test(input: &str) -> IResult<&str, NodeTest> {
    map(
        terminated(
            alt((
                tag("text"),
                tag("node"),
                tag("comment"),
                tag("processing-instruction"),
            )),
            pair(ws(char('(')), char(')')),
        ),
        |kind: &str| match kind {
            "text" => NodeTest::Kind(KindTest::Text),
            "comment" => NodeTest::Kind(KindTest::Comment),
            "processing-instruction" => NodeTest::Kind(KindTest::ProcessingInstruction),
            _ => NodeTest::Kind(KindTest::Node),
        },
    )(input)
}

/// A node test: `*`, a kind test, or a name. Also used by the match-pattern
/// grammar in the stylesheet compiler.
pub fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(char('*'), |_| NodeTest::Wildcard),
        kind_test,
        map(q_name, |name: String| {
            // Name tests match by local part.
            let local = match name.split_once(':') {
                Some((_, local)) => local.to_string(),
                None => name,
            };
            NodeTest::Name(local)
        }),
    ))(input)
}

fn axis(input: &str) -> IResult<&str, Axis> {
    map(
        terminated(
            alt((
                tag("child"),
                tag("descendant-or-self"),
                tag("descendant"),
                tag("attribute"),
                tag("parent"),
                tag("ancestor"),
                tag("self"),
                tag("following-sibling"),
                tag("preceding-sibling"),
                tag("following"),
                tag("preceding"),
            )),
            tag("::"),
        ),
        |name: &str| match name {
            "descendant-or-self" => Axis::DescendantOrSelf,
            "descendant" => Axis::Descendant,
            "attribute" => Axis::Attribute,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "self" => Axis::SelfAxis,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => Axis::Child,
        },
    )(input)
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expression, ws(char(']')))(input)
}

fn step(input: &str) -> IResult<&str, Step> {
    let (i, (axis, test)) = alt((
        map(tag(".."), |_| (Axis::Parent, NodeTest::Kind(KindTest::Node))),
        map(char('.'), |_| (Axis::SelfAxis, NodeTest::Kind(KindTest::Node))),
        map(preceded(char('@'), node_test), |t| (Axis::Attribute, t)),
        map(pair(opt(axis), node_test), |(a, t)| (a.unwrap_or(Axis::Child), t)),
    ))(input)?;
    let (i, predicates) = many0(predicate)(i)?;
    Ok((i, Step { axis, test, predicates }))
}

fn location_path(input: &str) -> IResult<&str, LocationPath> {
    let (i, (absolute, mut steps)) =
        if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("//")(input) {
            let (rem, first) = step(rem)?;
            (rem, (true, vec![Step::descendant_or_self_node(), first]))
        } else if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("/")(input) {
            match step(rem) {
                Ok((rem, first)) => (rem, (true, vec![first])),
                // The path is just "/".
                Err(_) => (rem, (true, Vec::new())),
            }
        } else {
            let (rem, first) = step(input)?;
            (rem, (false, vec![first]))
        };

    let (i, rest) = many0(pair(alt((tag("//"), tag("/"))), step))(i)?;
    for (sep, next) in rest {
        if sep == "//" {
            steps.push(Step::descendant_or_self_node());
        }
        steps.push(next);
    }
    Ok((i, LocationPath { start: None, absolute, steps }))
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (i, name) = q_name(input)?;
    let (i, _) = peek(ws(char('(')))(i)?;

    // `text()` and friends are node tests handled by the step parser.
    if name == "text" || name == "node" || name == "comment" || name == "processing-instruction" {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    let (i, args) = preceded(
        multispace0,
        delimited(char('('), separated_list0(ws(char(',')), expression), char(')')),
    )(i)?;
    Ok((i, Expression::FunctionCall { name, args }))
}
