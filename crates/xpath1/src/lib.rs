//! XPath 1.0 expression engine.
//!
//! Expressions are parsed once into an [`Expression`] and evaluated any
//! number of times against an [`EvalContext`] holding the document, the
//! context node, the context size and proximity position, and an optional
//! variable-lookup hook.

pub mod ast;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, KindTest, LocationPath, NodeTest, Step};
pub use engine::{EvalContext, Value, VariableResolver, evaluate};
pub use error::XPathError;
pub use parser::parse_expression;
