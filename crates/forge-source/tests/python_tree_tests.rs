//! PythonParser Tests
//!
//! Parses realistic server modules and checks the typed node walk.

use forge_source::{NodeVisitor, ParseError, PythonParser, SourceParser, StringLiteralNode};
use proptest::prelude::*;

const OAUTH_SERVER: &str = r#"import asyncio
import os

import httpx
from mcp import types
from mcp.server import Server
from mcp.server.stdio import stdio_server

CLIENT_ID = os.getenv("OAUTH_CLIENT_ID")
CLIENT_SECRET = os.getenv("OAUTH_CLIENT_SECRET")
REDIRECT_URI = os.getenv("OAUTH_REDIRECT_URI", "http://localhost:8080/callback")

server = Server("github-server")
access_token = None


def get_auth_url():
    return f"https://github.com/login/oauth/authorize?client_id={CLIENT_ID}"


@server.list_tools()
async def list_tools() -> list[types.Tool]:
    return [
        types.Tool(
            name="authenticate",
            description="Start the OAuth flow",
            inputSchema={"type": "object", "properties": {}},
        ),
    ]


@server.call_tool()
async def call_tool(name: str, arguments: dict) -> list[types.TextContent]:
    try:
        if name == "authenticate":
            return [types.TextContent(type="text", text=get_auth_url())]
        raise ValueError(f"unknown tool {name}")
    except Exception as e:
        return [types.TextContent(type="text", text=str(e))]


async def main():
    async with stdio_server() as (read_stream, write_stream):
        await server.run(read_stream, write_stream, server.create_initialization_options())


if __name__ == "__main__":
    asyncio.run(main())
"#;

#[derive(Default)]
struct LiteralCollector {
    values: Vec<String>,
}

impl NodeVisitor for LiteralCollector {
    fn visit_string_literal(&mut self, node: &StringLiteralNode) {
        self.values.push(node.value.clone());
    }
}

#[test]
fn test_parses_full_server_module() {
    let tree = PythonParser::new().parse(OAUTH_SERVER).unwrap();

    assert!(tree.has_import("mcp", Some("types")));
    assert!(tree.has_import("mcp.server", Some("Server")));
    assert!(tree.has_import("mcp.server.stdio", Some("stdio_server")));
    assert!(tree.has_import("httpx", None));

    assert!(tree.has_decorator("server.list_tools"));
    assert!(tree.has_decorator("server.call_tool"));
    assert!(tree.function("main").is_some_and(|f| f.is_async));
    assert!(tree.function("get_auth_url").is_some_and(|f| !f.is_async));
    assert!(tree.has_call("stdio_server"));
    assert!(tree.has_call("Server"));
}

#[test]
fn test_credentials_loaded_from_env() {
    let tree = PythonParser::new().parse(OAUTH_SERVER).unwrap();

    for name in ["CLIENT_ID", "CLIENT_SECRET", "REDIRECT_URI"] {
        let assignment = tree.assignments_to(name).next().unwrap();
        assert_eq!(assignment.value_callee.as_deref(), Some("os.getenv"), "{name}");
    }
}

#[test]
fn test_every_tool_declares_input_schema() {
    let tree = PythonParser::new().parse(OAUTH_SERVER).unwrap();

    let tools: Vec<_> = tree.calls_to("types.Tool").collect();
    assert_eq!(tools.len(), 1);
    assert!(tools[0].keywords.iter().any(|k| k == "inputSchema"));
}

#[test]
fn test_visitor_sees_literals_in_document_order() {
    let tree = PythonParser::new().parse(OAUTH_SERVER).unwrap();
    let mut collector = LiteralCollector::default();
    tree.walk(&mut collector);

    let auth = collector.values.iter().position(|v| v == "authenticate").unwrap();
    let main = collector.values.iter().position(|v| v == "__main__").unwrap();
    assert!(auth < main);
    assert_eq!(collector.values.first().map(String::as_str), Some("OAUTH_CLIENT_ID"));
}

#[test]
fn test_calls_inside_fstring_interpolation_are_collected() {
    let tree = PythonParser::new()
        .parse("msg = f\"token={os.getenv('TOKEN')}\"\n")
        .unwrap();
    assert!(tree.has_call("os.getenv"));
    assert!(tree.has_string_literal("TOKEN"));
}

#[test]
fn test_wildcard_import_satisfies_named_lookup() {
    let tree = PythonParser::new().parse("from mcp import *\n").unwrap();
    assert!(tree.has_import("mcp", Some("types")));
}

#[test]
fn test_unclosed_bracket_is_syntax_error() {
    let err = PythonParser::new()
        .parse("tools = [\n    1,\n    2,\n")
        .unwrap_err();
    assert!(matches!(err, ParseError::Syntax { .. }));
    assert!(err.location().is_some());
}

#[test]
fn test_prose_is_not_python() {
    let err = PythonParser::new()
        .parse("Here is your server: it does OAuth!\n")
        .unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
}

proptest! {
    #[test]
    fn prop_parse_is_deterministic(source in "[a-z_ =()\"'0-9\n:.]{0,80}") {
        let parser = PythonParser::new();
        let first = parser.parse(&source);
        let second = parser.parse(&source);
        prop_assert_eq!(first, second);
    }
}
