//! What the validator requires of a candidate
//!
//! Defaults describe an OAuth-backed MCP server over stdio. Every list can
//! be replaced from the `[validator]` table of the config file.

use forge_policy::{MarkerRule, RequiredMarker};
use serde::{Deserialize, Serialize};

/// Validator requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorRules {
    /// Stage B: imports that must be present
    pub required_imports: Vec<RequiredMarker>,
    /// Stage B: modules that only produce a warning
    pub discouraged_imports: Vec<String>,
    /// Stage C: structural contract
    pub structural_markers: Vec<RequiredMarker>,
    /// Stage D: domain wiring
    pub domain_markers: Vec<RequiredMarker>,
    /// Stage D: variables that must be loaded from the environment
    pub env_credentials: Vec<String>,
    /// Stage E: HTTP client module whose responses must be checked
    pub http_client_module: String,
    /// Stage F: capability-listing entrypoint
    pub listing_entrypoint: String,
    /// Stage F: capability-invocation entrypoint
    pub invocation_entrypoint: String,
    /// Stage F: capability safe to invoke without arguments
    pub bootstrap_capability: String,
}

impl Default for ValidatorRules {
    fn default() -> Self {
        Self {
            required_imports: vec![
                RequiredMarker::import_from("mcp_types_import", "mcp", "types"),
                RequiredMarker::import_from("mcp_server_import", "mcp.server", "Server"),
                RequiredMarker::import_from("mcp_stdio_import", "mcp.server.stdio", "stdio_server"),
            ],
            discouraged_imports: ["requests", "pickle", "socket", "shutil", "ctypes"]
                .map(String::from)
                .to_vec(),
            structural_markers: default_structural_markers(),
            domain_markers: default_domain_markers(),
            env_credentials: vec!["CLIENT_ID".to_string(), "CLIENT_SECRET".to_string()],
            http_client_module: "httpx".to_string(),
            listing_entrypoint: "list_tools".to_string(),
            invocation_entrypoint: "call_tool".to_string(),
            bootstrap_capability: "authenticate".to_string(),
        }
    }
}

fn marker(id: &str, description: &str, rule: MarkerRule) -> RequiredMarker {
    RequiredMarker::new(id, description, rule)
}

fn default_structural_markers() -> Vec<RequiredMarker> {
    vec![
        marker(
            "server_instance",
            "server instance `server = Server(...)`",
            MarkerRule::Call {
                callee: "Server".into(),
            },
        ),
        marker(
            "list_tools_decorator",
            "`@server.list_tools()` decorator",
            MarkerRule::Decorator {
                name: "server.list_tools".into(),
            },
        ),
        marker(
            "list_tools_entrypoint",
            "capability-listing entrypoint `async def list_tools()`",
            MarkerRule::AsyncFunction {
                name: "list_tools".into(),
            },
        ),
        marker(
            "call_tool_decorator",
            "`@server.call_tool()` decorator",
            MarkerRule::Decorator {
                name: "server.call_tool".into(),
            },
        ),
        marker(
            "call_tool_entrypoint",
            "capability-invocation entrypoint `async def call_tool(name, arguments)`",
            MarkerRule::AsyncFunction {
                name: "call_tool".into(),
            },
        ),
        marker(
            "tool_definitions",
            "tool definitions via `types.Tool(...)`",
            MarkerRule::Call {
                callee: "types.Tool".into(),
            },
        ),
        marker(
            "tool_input_schema",
            "`inputSchema=` on every `types.Tool(...)`",
            MarkerRule::CallKeyword {
                callee: "types.Tool".into(),
                keyword: "inputSchema".into(),
            },
        ),
        marker(
            "object_schema",
            "tool schemas declaring `\"type\": \"object\"`",
            MarkerRule::Text {
                needle: "\"type\": \"object\"".into(),
            },
        ),
        marker(
            "text_content_response",
            "responses built with `types.TextContent(...)`",
            MarkerRule::Call {
                callee: "types.TextContent".into(),
            },
        ),
        marker(
            "main_entrypoint",
            "`async def main()`",
            MarkerRule::AsyncFunction {
                name: "main".into(),
            },
        ),
        marker(
            "stdio_transport",
            "stdio transport via `stdio_server()`",
            MarkerRule::Call {
                callee: "stdio_server".into(),
            },
        ),
    ]
}

fn default_domain_markers() -> Vec<RequiredMarker> {
    vec![
        marker(
            "client_id_variable",
            "OAuth client id `CLIENT_ID`",
            MarkerRule::Assignment {
                target: "CLIENT_ID".into(),
            },
        ),
        marker(
            "client_secret_variable",
            "OAuth client secret `CLIENT_SECRET`",
            MarkerRule::Assignment {
                target: "CLIENT_SECRET".into(),
            },
        ),
        marker(
            "redirect_uri_variable",
            "OAuth redirect URI `REDIRECT_URI`",
            MarkerRule::Assignment {
                target: "REDIRECT_URI".into(),
            },
        ),
        marker(
            "auth_url_builder",
            "OAuth URL builder `get_auth_url`",
            MarkerRule::Function {
                name: "get_auth_url".into(),
            },
        ),
        marker(
            "access_token_handling",
            "access token handling (`access_token`)",
            MarkerRule::Text {
                needle: "access_token".into(),
            },
        ),
        marker(
            "authenticate_capability",
            "mandatory `\"authenticate\"` tool",
            MarkerRule::StringLiteral {
                value: "authenticate".into(),
            },
        ),
    ]
}
