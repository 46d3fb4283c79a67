//! XSLT 1.0 transformation engine.
//!
//! The pipeline has two halves: [`compile`] turns a parsed stylesheet
//! document into a [`CompiledStylesheet`] (template rules with match
//! patterns and pre-parsed instruction bodies), and [`apply_stylesheet`]
//! interprets those rules against a source document, producing a result
//! document. The compiled stylesheet is immutable and may be shared across
//! concurrent transformations; the source document is mutated by whitespace
//! stripping, so each transformation needs its own.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod output;
pub mod pattern;
pub mod sort;
pub mod transform;
pub mod variables;

pub use ast::{CompiledStylesheet, OutputMethod};
pub use compiler::compile;
pub use error::XsltError;
pub use transform::apply_stylesheet;
pub use variables::VariableStack;
