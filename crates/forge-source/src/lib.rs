//! Forge Source Layer
//!
//! The boundary between raw candidate text and the typed node walk that the
//! policy engine and the compliance validator inspect.
//!
//! # Core Operations
//!
//! - **Parse**: [`SourceParser::parse`] turns source text into a [`NodeTree`]
//!   or fails with a [`ParseError`] carrying line/column detail
//! - **Walk**: [`NodeTree::walk`] drives a [`NodeVisitor`] over typed nodes
//!   (import, call, string literal, function definition, assignment, try)
//! - **Query**: convenience lookups used by structural marker checks
//!
//! # Architecture
//!
//! ```text
//! candidate text → SourceParser (tree-sitter) → NodeTree → NodeVisitor
//!                                        ↘ ParseError (Stage A)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_source::{PythonParser, SourceParser};
//!
//! let tree = PythonParser::new().parse("import os\n")?;
//! assert!(tree.has_import("os", None));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod parsers;
pub mod tree;

pub use error::ParseError;
pub use parsers::{PythonParser, SourceParser};
pub use tree::{
    AssignmentNode, CallNode, FunctionNode, ImportNode, NodeTree, NodeVisitor, SourceNode,
    StringLiteralNode, TryNode,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
