//! Error types for source parsing

use forge_artifact::SourceLocation;

/// Errors while turning candidate text into a node tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Syntax error in the candidate
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line of the first offending node
        line: usize,
        /// 1-based column of the first offending node
        column: usize,
        /// Human-readable description
        message: String,
    },

    /// Grammar could not be loaded into the parser
    #[error("parser initialization failed: {0}")]
    ParserInit(String),

    /// Parser returned no tree (cancelled or timed out internally)
    #[error("parser produced no tree")]
    NoTree,
}

impl ParseError {
    /// Create syntax error at a location
    pub fn syntax(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Syntax {
            line: location.line,
            column: location.column,
            message: message.into(),
        }
    }

    /// Location of the error, when it points into the source
    #[must_use]
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Self::Syntax { line, column, .. } => Some(SourceLocation::new(*line, *column)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display_carries_position() {
        let err = ParseError::syntax(SourceLocation::new(3, 7), "unexpected `)`");
        assert_eq!(
            err.to_string(),
            "syntax error at line 3, column 7: unexpected `)`"
        );
        assert_eq!(err.location(), Some(SourceLocation::new(3, 7)));
    }

    #[test]
    fn non_syntax_errors_have_no_location() {
        assert_eq!(ParseError::NoTree.location(), None);
    }
}
