//! Source parsers
//!
//! Provides parsing from candidate text into a [`NodeTree`]. The only
//! built-in binding is Python via tree-sitter; other languages plug in by
//! implementing [`SourceParser`].

use crate::error::ParseError;
use crate::tree::NodeTree;

mod python;

pub use python::PythonParser;

/// Parser trait for turning candidate text into a typed node tree
///
/// Implementations must be deterministic: the same text always yields the
/// same tree or the same error.
pub trait SourceParser: Send + Sync + 'static {
    /// Parse source text
    ///
    /// # Errors
    /// Returns `ParseError::Syntax` with the position of the first offending
    /// token when the text does not parse.
    fn parse(&self, source: &str) -> Result<NodeTree, ParseError>;

    /// Language name reported in diagnostics
    fn language(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct EmptyParser;

    impl SourceParser for EmptyParser {
        fn parse(&self, source: &str) -> Result<NodeTree, ParseError> {
            Ok(NodeTree::new(source, Vec::new()))
        }

        fn language(&self) -> &'static str {
            "empty"
        }
    }

    #[test]
    fn parsers_are_object_safe() {
        let parsers: Vec<Arc<dyn SourceParser>> =
            vec![Arc::new(EmptyParser), Arc::new(PythonParser::new())];
        let names: Vec<_> = parsers.iter().map(|p| p.language()).collect();
        assert_eq!(names, vec!["empty", "python"]);
    }
}
