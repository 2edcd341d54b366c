//! Typed node tree
//!
//! A flattened, document-ordered view of the parts of a candidate that
//! guardrails and compliance checks care about. Everything else in the
//! syntax tree is dropped at parse time.

use forge_artifact::SourceLocation;
use serde::Serialize;

/// `import a.b` or `from a.b import c, d`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportNode {
    /// Imported module (`a.b`); relative imports keep their leading dots
    pub module: String,
    /// Names pulled in by a `from` import (`*` for wildcard); empty otherwise
    pub names: Vec<String>,
    /// Whether this was a `from ... import` statement
    pub from_import: bool,
    /// Statement position
    pub location: SourceLocation,
    /// Last line of the statement (1-based); differs from `location.line`
    /// for parenthesized or continued imports
    pub end_line: usize,
}

/// A call expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallNode {
    /// Dotted callee with whitespace removed (`os.getenv`, `types.Tool`)
    pub callee: String,
    /// Names of keyword arguments, in order
    pub keywords: Vec<String>,
    /// Call position
    pub location: SourceLocation,
}

impl CallNode {
    /// Last segment of the callee (`getenv` for `os.getenv`)
    #[must_use]
    pub fn name(&self) -> &str {
        self.callee.rsplit('.').next().unwrap_or(&self.callee)
    }

    /// Whether the callee is an attribute access rather than a bare name
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        self.callee.contains('.')
    }
}

/// A string literal with its quotes and prefix stripped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringLiteralNode {
    /// Literal contents (escape sequences left as written)
    pub value: String,
    /// Literal position
    pub location: SourceLocation,
}

/// A function definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionNode {
    /// Function name
    pub name: String,
    /// `async def`
    pub is_async: bool,
    /// Decorator expressions, callee form (`server.list_tools`)
    pub decorators: Vec<String>,
    /// Body contains a `try` statement
    pub has_failure_containment: bool,
    /// Definition position (the `def` line, not the decorators)
    pub location: SourceLocation,
}

/// `target = value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentNode {
    /// Assigned name (`CLIENT_ID`, `self.token`)
    pub target: String,
    /// Right-hand side is a plain string literal
    pub value_is_string: bool,
    /// Right-hand side callee when the value is a call
    pub value_callee: Option<String>,
    /// Statement position
    pub location: SourceLocation,
}

/// A `try` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryNode {
    /// Has at least one `except` clause (not just `finally`)
    pub has_except: bool,
    /// Statement position
    pub location: SourceLocation,
}

/// One typed node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceNode {
    /// Import statement
    Import(ImportNode),
    /// Call expression
    Call(CallNode),
    /// String literal
    StringLiteral(StringLiteralNode),
    /// Function definition
    FunctionDefinition(FunctionNode),
    /// Assignment
    Assignment(AssignmentNode),
    /// Try statement
    Try(TryNode),
}

impl SourceNode {
    /// Position of the node
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        match self {
            Self::Import(n) => n.location,
            Self::Call(n) => n.location,
            Self::StringLiteral(n) => n.location,
            Self::FunctionDefinition(n) => n.location,
            Self::Assignment(n) => n.location,
            Self::Try(n) => n.location,
        }
    }
}

/// Visitor over typed nodes
///
/// Every method defaults to a no-op, so implementors only override the node
/// kinds they inspect.
pub trait NodeVisitor {
    /// Called for each import statement
    fn visit_import(&mut self, _node: &ImportNode) {}
    /// Called for each call expression
    fn visit_call(&mut self, _node: &CallNode) {}
    /// Called for each string literal
    fn visit_string_literal(&mut self, _node: &StringLiteralNode) {}
    /// Called for each function definition
    fn visit_function(&mut self, _node: &FunctionNode) {}
    /// Called for each assignment
    fn visit_assignment(&mut self, _node: &AssignmentNode) {}
    /// Called for each try statement
    fn visit_try(&mut self, _node: &TryNode) {}
}

/// Parsed candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTree {
    source: String,
    nodes: Vec<SourceNode>,
}

impl NodeTree {
    /// Build a tree from already-collected nodes
    ///
    /// Nodes are kept in the order given, which parsers guarantee is
    /// document order.
    #[must_use]
    pub fn new(source: impl Into<String>, nodes: Vec<SourceNode>) -> Self {
        Self {
            source: source.into(),
            nodes,
        }
    }

    /// Source text the tree was parsed from
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All nodes in document order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[SourceNode] {
        &self.nodes
    }

    /// Drive a visitor over every node in document order
    pub fn walk<V: NodeVisitor + ?Sized>(&self, visitor: &mut V) {
        for node in &self.nodes {
            match node {
                SourceNode::Import(n) => visitor.visit_import(n),
                SourceNode::Call(n) => visitor.visit_call(n),
                SourceNode::StringLiteral(n) => visitor.visit_string_literal(n),
                SourceNode::FunctionDefinition(n) => visitor.visit_function(n),
                SourceNode::Assignment(n) => visitor.visit_assignment(n),
                SourceNode::Try(n) => visitor.visit_try(n),
            }
        }
    }

    /// Import statements
    pub fn imports(&self) -> impl Iterator<Item = &ImportNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::Import(i) => Some(i),
            _ => None,
        })
    }

    /// Call expressions
    pub fn calls(&self) -> impl Iterator<Item = &CallNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::Call(c) => Some(c),
            _ => None,
        })
    }

    /// String literals
    pub fn string_literals(&self) -> impl Iterator<Item = &StringLiteralNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::StringLiteral(s) => Some(s),
            _ => None,
        })
    }

    /// Function definitions
    pub fn functions(&self) -> impl Iterator<Item = &FunctionNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::FunctionDefinition(f) => Some(f),
            _ => None,
        })
    }

    /// Assignments
    pub fn assignments(&self) -> impl Iterator<Item = &AssignmentNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::Assignment(a) => Some(a),
            _ => None,
        })
    }

    /// Try statements
    pub fn try_statements(&self) -> impl Iterator<Item = &TryNode> {
        self.nodes.iter().filter_map(|n| match n {
            SourceNode::Try(t) => Some(t),
            _ => None,
        })
    }

    /// Whether `module` is imported
    ///
    /// With `name`, only `from module import name` (or a wildcard) counts.
    /// Without it, either import form counts.
    #[must_use]
    pub fn has_import(&self, module: &str, name: Option<&str>) -> bool {
        self.imports().any(|i| {
            i.module == module
                && match name {
                    Some(name) => {
                        i.from_import && i.names.iter().any(|n| n == name || n == "*")
                    }
                    None => true,
                }
        })
    }

    /// Whether any call has exactly this callee
    #[must_use]
    pub fn has_call(&self, callee: &str) -> bool {
        self.calls().any(|c| c.callee == callee)
    }

    /// Calls with exactly this callee
    pub fn calls_to<'a>(&'a self, callee: &'a str) -> impl Iterator<Item = &'a CallNode> + 'a {
        self.calls().filter(move |c| c.callee == callee)
    }

    /// First function with this name
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionNode> {
        self.functions().find(|f| f.name == name)
    }

    /// Whether any function carries this decorator
    #[must_use]
    pub fn has_decorator(&self, decorator: &str) -> bool {
        self.functions()
            .any(|f| f.decorators.iter().any(|d| d == decorator))
    }

    /// Whether a string literal with exactly this value exists
    #[must_use]
    pub fn has_string_literal(&self, value: &str) -> bool {
        self.string_literals().any(|s| s.value == value)
    }

    /// Assignments to this exact target
    pub fn assignments_to<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = &'a AssignmentNode> + 'a {
        self.assignments().filter(move |a| a.target == target)
    }
}
