//! The abstract syntax of XPath 1.0 expressions.

/// A parsed expression, reusable across any number of evaluations.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    Variable(String),
    Path(LocationPath),
    FunctionCall { name: String, args: Vec<Expression> },
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Negate(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Union,
}

/// A location path: `foo/bar`, `/doc//item[1]`, `$set/child::*`, …
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// Expression the path is rooted in, for forms like `$var/foo`.
    pub start: Option<Box<Expression>>,
    /// True when the path starts at the document root. Ignored when `start`
    /// is present.
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    /// The step written `.` (and the implicit steps of `//`): `self::node()`.
    pub fn self_node() -> Step {
        Step { axis: Axis::SelfAxis, test: NodeTest::Kind(KindTest::Node), predicates: Vec::new() }
    }

    /// The implicit `descendant-or-self::node()` step produced by `//`.
    pub fn descendant_or_self_node() -> Step {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Kind(KindTest::Node),
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    Parent,
    Ancestor,
    SelfAxis,
    Descendant,
    DescendantOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

/// What a step accepts: a local name, any principal node, or a node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Matches the principal node kind by local name; a prefix written in
    /// the expression is dropped at parse time.
    Name(String),
    Wildcard,
    Kind(KindTest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTest {
    Text,
    Comment,
    ProcessingInstruction,
    Node,
}
