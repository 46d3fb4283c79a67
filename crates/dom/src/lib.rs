//! Arena-allocated XML document trees.
//!
//! Both the source and the result side of a transformation use the same
//! `Document` type: a flat arena of nodes addressed by `NodeId`, with parent
//! and child links stored as indices. Node ids are handed out in creation
//! order, so for a parsed document the id order is the document order.

pub mod document;
pub mod error;
pub mod node;
pub mod parse;
pub mod serialize;

pub use document::{Doctype, Document};
pub use error::DomError;
pub use node::{NodeId, NodeKind, NsDecl, QName};
