use serde::{Deserialize, Serialize};
use std::fmt;

/// Position inside a candidate's source text (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl SourceLocation {
    /// Create location
    #[inline]
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Location covering a whole line
    #[inline]
    #[must_use]
    pub const fn line(line: usize) -> Self {
        Self { line, column: 1 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}
