//! Required structural markers
//!
//! A marker is a named predicate over a [`NodeTree`]. The policy engine uses
//! them for its `missing_required_marker` rule and the compliance validator
//! reuses the same type for its structural and domain stages.

use forge_source::NodeTree;
use serde::{Deserialize, Serialize};

/// Predicate a candidate must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerRule {
    /// `import module` or, with `name`, `from module import name`
    Import {
        /// Module path
        module: String,
        /// Imported name
        #[serde(default)]
        name: Option<String>,
    },
    /// `async def name(...)`
    AsyncFunction {
        /// Function name
        name: String,
    },
    /// `def name(...)` or `async def name(...)`
    Function {
        /// Function name
        name: String,
    },
    /// Any function decorated with `@name(...)` or `@name`
    Decorator {
        /// Decorator callee
        name: String,
    },
    /// Any call to `callee`
    Call {
        /// Dotted callee
        callee: String,
    },
    /// At least one call to `callee`, and every such call passes `keyword`
    CallKeyword {
        /// Dotted callee
        callee: String,
        /// Keyword argument name
        keyword: String,
    },
    /// Any assignment to `target`
    Assignment {
        /// Assigned name
        target: String,
    },
    /// A string literal with exactly this value
    StringLiteral {
        /// Literal value
        value: String,
    },
    /// Raw substring of the source
    Text {
        /// Substring
        needle: String,
    },
}

impl MarkerRule {
    /// Evaluate against a parsed candidate
    #[must_use]
    pub fn is_satisfied(&self, tree: &NodeTree) -> bool {
        match self {
            Self::Import { module, name } => tree.has_import(module, name.as_deref()),
            Self::AsyncFunction { name } => tree.function(name).is_some_and(|f| f.is_async),
            Self::Function { name } => tree.function(name).is_some(),
            Self::Decorator { name } => tree.has_decorator(name),
            Self::Call { callee } => tree.has_call(callee),
            Self::CallKeyword { callee, keyword } => {
                let mut calls = tree.calls_to(callee).peekable();
                calls.peek().is_some() && calls.all(|c| c.keywords.iter().any(|k| k == keyword))
            }
            Self::Assignment { target } => tree.assignments_to(target).next().is_some(),
            Self::StringLiteral { value } => tree.has_string_literal(value),
            Self::Text { needle } => tree.source().contains(needle.as_str()),
        }
    }
}

/// A named marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredMarker {
    /// Stable identifier, reported as the violation or failure subject
    pub id: String,
    /// What the marker stands for, in prose
    pub description: String,
    /// Predicate
    pub rule: MarkerRule,
}

impl RequiredMarker {
    /// Create marker
    pub fn new(id: impl Into<String>, description: impl Into<String>, rule: MarkerRule) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            rule,
        }
    }

    /// `from module import name`
    pub fn import_from(id: impl Into<String>, module: &str, name: &str) -> Self {
        Self::new(
            id,
            format!("from {module} import {name}"),
            MarkerRule::Import {
                module: module.to_string(),
                name: Some(name.to_string()),
            },
        )
    }

    /// Evaluate against a parsed candidate
    #[inline]
    #[must_use]
    pub fn is_satisfied(&self, tree: &NodeTree) -> bool {
        self.rule.is_satisfied(tree)
    }
}

/// Markers missing from `tree`, in declaration order
pub fn missing<'a>(
    markers: &'a [RequiredMarker],
    tree: &'a NodeTree,
) -> impl Iterator<Item = &'a RequiredMarker> + 'a {
    markers.iter().filter(move |m| !m.is_satisfied(tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_source::{PythonParser, SourceParser};

    fn tree(source: &str) -> NodeTree {
        PythonParser::new().parse(source).unwrap()
    }

    #[test]
    fn import_marker_respects_name() {
        let t = tree("from mcp import types\n");
        let marker = RequiredMarker::import_from("types", "mcp", "types");
        assert!(marker.is_satisfied(&t));
        assert_eq!(marker.description, "from mcp import types");
        assert!(!RequiredMarker::import_from("server", "mcp", "server").is_satisfied(&t));
    }

    #[test]
    fn async_function_marker_rejects_sync_def() {
        let rule = MarkerRule::AsyncFunction {
            name: "list_tools".into(),
        };
        assert!(!rule.is_satisfied(&tree("def list_tools():\n    return []\n")));
        assert!(rule.is_satisfied(&tree("async def list_tools():\n    return []\n")));
    }

    #[test]
    fn call_keyword_requires_every_call() {
        let rule = MarkerRule::CallKeyword {
            callee: "types.Tool".into(),
            keyword: "inputSchema".into(),
        };
        assert!(!rule.is_satisfied(&tree("x = 1\n")));
        assert!(rule.is_satisfied(&tree("types.Tool(name='a', inputSchema={})\n")));
        assert!(!rule.is_satisfied(&tree(
            "types.Tool(name='a', inputSchema={})\ntypes.Tool(name='b')\n"
        )));
    }

    #[test]
    fn missing_preserves_declaration_order() {
        let markers = vec![
            RequiredMarker::new("a", "a", MarkerRule::Function { name: "a".into() }),
            RequiredMarker::new("b", "b", MarkerRule::Function { name: "b".into() }),
            RequiredMarker::new("c", "c", MarkerRule::Function { name: "c".into() }),
        ];
        let t = tree("def b():\n    pass\n");
        let ids: Vec<_> = missing(&markers, &t).map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn marker_rule_serde_is_tagged() {
        let rule = MarkerRule::Decorator {
            name: "server.list_tools".into(),
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"kind":"decorator","name":"server.list_tools"}"#);
    }
}
