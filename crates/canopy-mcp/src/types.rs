//! API-facing types for the gateway engine

use std::collections::HashMap;

use canopy_store::{
    HttpUpstreamConfig, PromptArgument, SessionMode, SseUpstreamConfig, StdioUpstreamConfig,
    UpstreamConfig,
};
use serde::{Deserialize, Serialize};

use crate::naming::validate_server_name;
use crate::McpError;

/// Input for registering a new upstream MCP server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterServerInput {
    /// Unique name of the server within the gateway
    pub name: String,

    /// Transport protocol: `stdio`, `streamable_http`, or `sse`
    pub transport: String,

    #[serde(default)]
    pub description: String,

    /// Remote server URL; mandatory for streamable_http and sse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Static token for authenticating against the upstream.
    /// Ignored for stdio transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Custom HTTP headers forwarded to streamable_http upstreams.
    /// A custom `Authorization` header takes precedence over `bearer_token`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Command to run the server; mandatory for stdio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// `stateless` (default) or `stateful`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_mode: Option<String>,
}

impl RegisterServerInput {
    /// Validate the input and produce the transport config and session mode
    pub fn into_parts(self) -> Result<(String, String, UpstreamConfig, SessionMode), McpError> {
        validate_server_name(&self.name)?;

        let session_mode = match self.session_mode.as_deref() {
            None | Some("") | Some("stateless") => SessionMode::Stateless,
            Some("stateful") => SessionMode::Stateful,
            Some(other) => {
                return Err(McpError::Validation(format!(
                    "unsupported session mode: {other} (acceptable values: 'stateless', 'stateful')"
                )));
            }
        };

        let config = match self.transport.as_str() {
            "streamable_http" => {
                let url = self
                    .url
                    .ok_or_else(|| McpError::Validation("url is required for streamable HTTP transport".to_string()))?;
                validate_http_url(&url)?;
                UpstreamConfig::StreamableHttp(HttpUpstreamConfig {
                    url,
                    bearer_token: self.bearer_token,
                    headers: self.headers,
                })
            }
            "stdio" => {
                let command = self
                    .command
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| McpError::Validation("command is required for stdio transport".to_string()))?;
                UpstreamConfig::Stdio(StdioUpstreamConfig {
                    command,
                    args: self.args,
                    env: self.env,
                })
            }
            "sse" => {
                let url = self
                    .url
                    .ok_or_else(|| McpError::Validation("url is required for SSE transport".to_string()))?;
                validate_http_url(&url)?;
                UpstreamConfig::Sse(SseUpstreamConfig {
                    url,
                    bearer_token: self.bearer_token,
                })
            }
            "" => {
                return Err(McpError::Validation(
                    "transport is required (acceptable values: 'streamable_http', 'stdio', 'sse')".to_string(),
                ));
            }
            other => {
                return Err(McpError::Validation(format!(
                    "unsupported transport type: {other} (acceptable values: 'streamable_http', 'stdio', 'sse')"
                )));
            }
        };

        Ok((self.name, self.description, config, session_mode))
    }
}

fn validate_http_url(raw: &str) -> Result<(), McpError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| McpError::Validation(format!("'{raw}' is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(McpError::Validation(format!("'{raw}' must be an http or https URL")));
    }
    Ok(())
}

/// Result of a proxied tool call, as handed to API consumers
///
/// Content items are generic maps rather than typed content blocks: a tool
/// may return text, images, or resources and they are passed through
/// untouched. The serialized field names match the MCP wire format so a
/// `CallToolResult` round-trips through this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInvokeResult {
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    #[serde(default)]
    pub content: Vec<serde_json::Map<String, serde_json::Value>>,

    #[serde(rename = "structuredContent", default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
}

impl ToolInvokeResult {
    /// Convert the MCP library's call result into the API shape
    pub fn from_call_result(result: &rmcp::model::CallToolResult) -> Result<Self, McpError> {
        let value = serde_json::to_value(result)
            .map_err(|e| McpError::Internal(format!("failed to serialize tool call result: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("failed to convert tool call result: {e}")))
    }

    /// Convert back into the MCP library's call result
    pub fn into_call_result(self) -> Result<rmcp::model::CallToolResult, McpError> {
        let value = serde_json::to_value(&self)
            .map_err(|e| McpError::Internal(format!("failed to serialize tool call result: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| McpError::Internal(format!("failed to convert tool call result: {e}")))
    }
}

/// A tool as listed through the admin API, under its canonical name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

/// A prompt as listed through the admin API, under its canonical name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSummary {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// Result of enabling or disabling an entire server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableDisableServerResult {
    pub name: String,
    pub tools_affected: Vec<String>,
    pub prompts_affected: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_input_builds_config() {
        let input = RegisterServerInput {
            name: "fs".to_string(),
            transport: "stdio".to_string(),
            command: Some("echo".to_string()),
            args: vec!["hi".to_string()],
            ..Default::default()
        };
        let (name, _, config, mode) = input.into_parts().unwrap();
        assert_eq!(name, "fs");
        assert_eq!(mode, SessionMode::Stateless);
        match config {
            UpstreamConfig::Stdio(c) => {
                assert_eq!(c.command, "echo");
                assert_eq!(c.args, vec!["hi"]);
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn streamable_http_requires_url() {
        let input = RegisterServerInput {
            name: "remote".to_string(),
            transport: "streamable_http".to_string(),
            ..Default::default()
        };
        let err = input.into_parts().unwrap_err();
        assert_eq!(err.to_string(), "url is required for streamable HTTP transport");
    }

    #[test]
    fn stdio_requires_command() {
        let input = RegisterServerInput {
            name: "fs".to_string(),
            transport: "stdio".to_string(),
            ..Default::default()
        };
        assert!(input.into_parts().is_err());
    }

    #[test]
    fn rejects_unknown_transport_and_session_mode() {
        let input = RegisterServerInput {
            name: "x".to_string(),
            transport: "websocket".to_string(),
            ..Default::default()
        };
        assert!(input.into_parts().is_err());

        let input = RegisterServerInput {
            name: "x".to_string(),
            transport: "stdio".to_string(),
            command: Some("run".to_string()),
            session_mode: Some("sticky".to_string()),
            ..Default::default()
        };
        assert!(input.into_parts().is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let input = RegisterServerInput {
            name: "remote".to_string(),
            transport: "streamable_http".to_string(),
            url: Some("ftp://example.com/mcp".to_string()),
            ..Default::default()
        };
        assert!(input.into_parts().is_err());
    }

    #[test]
    fn stateful_session_mode_parses() {
        let input = RegisterServerInput {
            name: "fs".to_string(),
            transport: "stdio".to_string(),
            command: Some("run".to_string()),
            session_mode: Some("stateful".to_string()),
            ..Default::default()
        };
        let (_, _, _, mode) = input.into_parts().unwrap();
        assert_eq!(mode, SessionMode::Stateful);
    }

    #[test]
    fn invoke_result_round_trips_call_result() {
        let call_result = rmcp::model::CallToolResult::success(vec![rmcp::model::Content::text("4")]);
        let api = ToolInvokeResult::from_call_result(&call_result).unwrap();
        assert_eq!(api.content.len(), 1);
        assert_eq!(api.content[0]["type"], "text");
        assert_eq!(api.content[0]["text"], "4");

        let back = api.into_call_result().unwrap();
        assert_eq!(back.content.len(), 1);
    }
}
