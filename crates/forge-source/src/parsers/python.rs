//! Python binding of the source tree abstraction (tree-sitter)

use crate::error::ParseError;
use crate::parsers::SourceParser;
use crate::tree::{
    AssignmentNode, CallNode, FunctionNode, ImportNode, NodeTree, SourceNode, StringLiteralNode,
    TryNode,
};
use forge_artifact::SourceLocation;
use tree_sitter::{Node, Parser};

/// Python parser backed by tree-sitter-python
///
/// Stateless: a fresh `tree_sitter::Parser` is created per call, so one
/// instance can be shared across concurrent orchestrator runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonParser;

impl PythonParser {
    /// Create new parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for PythonParser {
    fn parse(&self, source: &str) -> Result<NodeTree, ParseError> {
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ParseError::ParserInit(e.to_string()))?;

        let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();

        if let Some(bad) = first_error(root) {
            let err = syntax_error(bad, source);
            tracing::debug!("python parse rejected: {}", err);
            return Err(err);
        }

        let mut collector = Collector {
            bytes: source.as_bytes(),
            nodes: Vec::new(),
        };
        collector.collect(root);

        Ok(NodeTree::new(source, collector.nodes))
    }

    fn language(&self) -> &'static str {
        "python"
    }
}

/// Pre-order search for the first ERROR or MISSING node
///
/// Walks with a cursor so nesting depth is bounded by the heap, not the stack.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return Some(root);
            }
        }
    }
}

fn location_of(node: Node<'_>) -> SourceLocation {
    let pos = node.start_position();
    SourceLocation::new(pos.row + 1, pos.column + 1)
}

fn end_line_of(node: Node<'_>) -> usize {
    node.end_position().row + 1
}

fn syntax_error(node: Node<'_>, source: &str) -> ParseError {
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
        let snippet: String = text
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .chars()
            .take(40)
            .collect();
        if snippet.is_empty() {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected `{snippet}`")
        }
    };
    ParseError::syntax(location_of(node), message)
}

/// Whether `kind` occurs below `node`, not looking inside nested functions
fn contains_kind(node: Node<'_>, kind: &str) -> bool {
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            if child.kind() == kind {
                return true;
            }
            if child.kind() != "function_definition" {
                pending.push(child);
            }
        }
    }
    false
}

fn has_child_kind(node: Node<'_>, kinds: &[&str]) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| kinds.contains(&c.kind()));
    found
}

struct Collector<'src> {
    bytes: &'src [u8],
    nodes: Vec<SourceNode>,
}

impl Collector<'_> {
    fn text(&self, node: Node<'_>) -> String {
        node.utf8_text(self.bytes).unwrap_or_default().to_string()
    }

    /// Text with all whitespace removed, for dotted names and callees
    fn compact(&self, node: Node<'_>) -> String {
        node.utf8_text(self.bytes)
            .unwrap_or_default()
            .split_whitespace()
            .collect()
    }

    fn imported_name(&self, node: Node<'_>) -> String {
        if node.kind() == "aliased_import" {
            node.child_by_field_name("name")
                .map(|n| self.compact(n))
                .unwrap_or_default()
        } else {
            self.compact(node)
        }
    }

    /// Pre-order walk in document order, using an explicit stack
    fn collect(&mut self, root: Node<'_>) {
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            let is_string = node.kind() == "string";
            match node.kind() {
                "import_statement" => self.import_statement(node),
                "import_from_statement" => self.import_from_statement(node),
                "call" => self.call(node),
                "string" => self.string(node),
                "function_definition" => self.function(node),
                "assignment" => self.assignment(node),
                "try_statement" => self.try_statement(node),
                _ => {}
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node
                .children(&mut cursor)
                // only interpolations inside a string can hold further nodes of interest
                .filter(|child| !is_string || child.kind() == "interpolation")
                .collect();
            pending.extend(children.into_iter().rev());
        }
    }

    fn import_statement(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let modules: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .map(|n| self.imported_name(n))
            .collect();
        let location = location_of(node);
        let end_line = end_line_of(node);
        for module in modules {
            self.nodes.push(SourceNode::Import(ImportNode {
                module,
                names: Vec::new(),
                from_import: false,
                location,
                end_line,
            }));
        }
    }

    fn import_from_statement(&mut self, node: Node<'_>) {
        let module = node
            .child_by_field_name("module_name")
            .map(|n| self.compact(n))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let mut names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .map(|n| self.imported_name(n))
            .collect();
        if has_child_kind(node, &["wildcard_import"]) {
            names.push("*".to_string());
        }

        self.nodes.push(SourceNode::Import(ImportNode {
            module,
            names,
            from_import: true,
            location: location_of(node),
            end_line: end_line_of(node),
        }));
    }

    fn call(&mut self, node: Node<'_>) {
        let callee = node
            .child_by_field_name("function")
            .map(|f| self.compact(f))
            .unwrap_or_default();

        let keywords = node
            .child_by_field_name("arguments")
            .map(|args| {
                let mut cursor = args.walk();
                let names: Vec<String> = args
                    .named_children(&mut cursor)
                    .filter(|a| a.kind() == "keyword_argument")
                    .filter_map(|a| a.child_by_field_name("name"))
                    .map(|n| self.text(n))
                    .collect();
                names
            })
            .unwrap_or_default();

        self.nodes.push(SourceNode::Call(CallNode {
            callee,
            keywords,
            location: location_of(node),
        }));
    }

    fn string(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let value: String = node
            .children(&mut cursor)
            .filter(|c| c.kind() == "string_content")
            .map(|c| self.text(c))
            .collect();

        self.nodes.push(SourceNode::StringLiteral(StringLiteralNode {
            value,
            location: location_of(node),
        }));
    }

    fn decorators_of(&self, node: Node<'_>) -> Vec<String> {
        let Some(parent) = node.parent().filter(|p| p.kind() == "decorated_definition") else {
            return Vec::new();
        };

        let mut cursor = parent.walk();
        let decorators: Vec<Node<'_>> = parent
            .children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .collect();

        decorators
            .into_iter()
            .filter_map(|decorator| {
                let mut inner = decorator.walk();
                let expr = decorator.named_children(&mut inner).next();
                expr
            })
            .map(|expr| {
                if expr.kind() == "call" {
                    expr.child_by_field_name("function")
                        .map(|f| self.compact(f))
                        .unwrap_or_default()
                } else {
                    self.compact(expr)
                }
            })
            .collect()
    }

    fn function(&mut self, node: Node<'_>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let has_failure_containment = node
            .child_by_field_name("body")
            .is_some_and(|body| contains_kind(body, "try_statement"));

        let function = FunctionNode {
            name,
            is_async: has_child_kind(node, &["async"]),
            decorators: self.decorators_of(node),
            has_failure_containment,
            location: location_of(node),
        };
        self.nodes.push(SourceNode::FunctionDefinition(function));
    }

    fn assignment(&mut self, node: Node<'_>) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if !matches!(left.kind(), "identifier" | "attribute") {
            return;
        }

        let right = node.child_by_field_name("right");
        let value_is_string =
            right.is_some_and(|r| matches!(r.kind(), "string" | "concatenated_string"));
        let value_callee = right
            .filter(|r| r.kind() == "call")
            .and_then(|r| r.child_by_field_name("function"))
            .map(|f| self.compact(f));

        self.nodes.push(SourceNode::Assignment(AssignmentNode {
            target: self.compact(left),
            value_is_string,
            value_callee,
            location: location_of(node),
        }));
    }

    fn try_statement(&mut self, node: Node<'_>) {
        self.nodes.push(SourceNode::Try(TryNode {
            has_except: has_child_kind(node, &["except_clause", "except_group_clause"]),
            location: location_of(node),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = r#"import os
from mcp import types
from mcp.server import Server as McpServer

CLIENT_ID = os.getenv("OAUTH_CLIENT_ID")
TOKEN = "literal"

server = McpServer("demo")

@server.list_tools()
async def list_tools():
    return [types.Tool(name="authenticate", inputSchema={"type": "object"})]

async def call_tool(name, arguments):
    try:
        return []
    except Exception:
        return []
"#;

    fn parse(source: &str) -> NodeTree {
        PythonParser::new().parse(source).expect("source should parse")
    }

    #[test]
    fn collects_imports_with_aliases() {
        let tree = parse(SERVER);
        assert!(tree.has_import("os", None));
        assert!(tree.has_import("mcp", Some("types")));
        assert!(tree.has_import("mcp.server", Some("Server")));
    }

    #[test]
    fn parenthesized_import_spans_lines() {
        let tree = parse("from __future__ import (\n    annotations,\n)\nimport os\n");
        let imports: Vec<_> = tree.imports().collect();
        assert_eq!(imports[0].module, "__future__");
        assert_eq!(imports[0].names, vec!["annotations".to_string()]);
        assert_eq!((imports[0].location.line, imports[0].end_line), (1, 3));
        assert_eq!((imports[1].location.line, imports[1].end_line), (4, 4));
    }

    #[test]
    fn collects_async_functions_and_decorators() {
        let tree = parse(SERVER);

        let list_tools = tree.function("list_tools").unwrap();
        assert!(list_tools.is_async);
        assert_eq!(list_tools.decorators, vec!["server.list_tools".to_string()]);
        assert!(!list_tools.has_failure_containment);

        let call_tool = tree.function("call_tool").unwrap();
        assert!(call_tool.decorators.is_empty());
        assert!(call_tool.has_failure_containment);
    }

    #[test]
    fn collects_calls_with_keywords() {
        let tree = parse(SERVER);
        let tool = tree.calls_to("types.Tool").next().unwrap();
        assert_eq!(tool.keywords, vec!["name".to_string(), "inputSchema".to_string()]);
        assert!(tree.has_call("os.getenv"));
    }

    #[test]
    fn collects_string_values_without_quotes() {
        let tree = parse(SERVER);
        assert!(tree.has_string_literal("authenticate"));
        assert!(tree.has_string_literal("OAUTH_CLIENT_ID"));
    }

    #[test]
    fn collects_assignments() {
        let tree = parse(SERVER);
        let client_id = tree.assignments_to("CLIENT_ID").next().unwrap();
        assert_eq!(client_id.value_callee.as_deref(), Some("os.getenv"));
        assert!(!client_id.value_is_string);

        let token = tree.assignments_to("TOKEN").next().unwrap();
        assert!(token.value_is_string);
        assert_eq!(token.location.line, 6);
    }

    #[test]
    fn collects_try_statements() {
        let tree = parse(SERVER);
        let tries: Vec<_> = tree.try_statements().collect();
        assert_eq!(tries.len(), 1);
        assert!(tries[0].has_except);
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = PythonParser::new()
            .parse("import os\ndef broken(:\n    pass\n")
            .unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn deep_nesting_does_not_exhaust_stack() {
        let depth = 20_000;
        let nested = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let tree = parse(&nested);
        assert_eq!(tree.assignments_to("x").count(), 1);

        let unclosed = format!("x = {}1\n", "(".repeat(depth));
        assert!(matches!(
            PythonParser::new().parse(&unclosed),
            Err(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn empty_source_parses_to_empty_tree() {
        let tree = parse("");
        assert!(tree.nodes().is_empty());
    }
}
