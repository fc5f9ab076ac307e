//! Registry entity records
//!
//! These are the rows as the rest of the gateway sees them. Transport
//! configuration is stored as a tagged JSON blob alongside a `transport`
//! column so servers can be listed without deserializing every config.

use std::collections::HashMap;

use canopy_config::ServerMode;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Transport protocol of an upstream MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Sse,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::StreamableHttp => "streamable_http",
            Self::Sse => "sse",
        }
    }

    pub fn parse(input: &str) -> Result<Self, StoreError> {
        match input {
            "stdio" => Ok(Self::Stdio),
            "streamable_http" => Ok(Self::StreamableHttp),
            "sse" => Ok(Self::Sse),
            other => Err(StoreError::Internal(format!("unknown transport in store: {other}"))),
        }
    }
}

/// How the gateway manages connections to an upstream server
///
/// Stateless opens a fresh session per tool call. Stateful keeps one
/// session alive across calls, for upstreams that need login state or have
/// slow cold starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Stateless,
    Stateful,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stateless => "stateless",
            Self::Stateful => "stateful",
        }
    }

    pub fn parse(input: &str) -> Result<Self, StoreError> {
        match input {
            "stateless" | "" => Ok(Self::Stateless),
            "stateful" => Ok(Self::Stateful),
            other => Err(StoreError::Internal(format!("unknown session mode in store: {other}"))),
        }
    }
}

/// Streamable-HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpUpstreamConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Stdio transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioUpstreamConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// SSE transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseUpstreamConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

/// Transport-specific upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum UpstreamConfig {
    Stdio(StdioUpstreamConfig),
    StreamableHttp(HttpUpstreamConfig),
    Sse(SseUpstreamConfig),
}

impl UpstreamConfig {
    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
            Self::Sse(_) => TransportKind::Sse,
        }
    }
}

/// An upstream MCP server registered in the gateway
#[derive(Debug, Clone)]
pub struct McpServerRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub config: UpstreamConfig,
    pub session_mode: SessionMode,
}

impl McpServerRecord {
    pub fn transport(&self) -> TransportKind {
        self.config.transport()
    }
}

/// A tool imported from an upstream server
///
/// `name` is the short form, unique only within the parent server.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub annotations: Option<serde_json::Value>,
    pub enabled: bool,
}

/// A single argument a prompt accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt imported from an upstream server
#[derive(Debug, Clone)]
pub struct PromptRecord {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub enabled: bool,
}

/// Inclusion/exclusion spec of a tool group
///
/// `included_tools` and `excluded_tools` hold canonical names;
/// `included_servers` pulls in every enabled tool of a server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub included_tools: Vec<String>,
    #[serde(default)]
    pub included_servers: Vec<String>,
    #[serde(default)]
    pub excluded_tools: Vec<String>,
}

/// A named subset view over the global tool catalog
#[derive(Debug, Clone)]
pub struct ToolGroupRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub spec: GroupSpec,
}

/// An agent client authorized to call the MCP proxy
#[derive(Debug, Clone)]
pub struct McpClientRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Upstream server names this client may call; `"*"` grants all
    pub allow_list: Vec<String>,
    pub access_token: String,
    /// Whether the operator supplied the token instead of the generator
    pub is_custom_access_token: bool,
}

impl McpClientRecord {
    /// Whether the allow-list covers the given upstream server
    pub fn allows(&self, server_name: &str) -> bool {
        self.allow_list.iter().any(|entry| entry == "*" || entry == server_name)
    }
}

/// Role of a human user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub fn parse(input: &str) -> Result<Self, StoreError> {
        match input {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(StoreError::Internal(format!("unknown user role in store: {other}"))),
        }
    }
}

/// A human user of the admin API
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
    pub access_token: String,
}

/// Process-wide singleton capturing initialization state
#[derive(Debug, Clone)]
pub struct ServerConfigRecord {
    pub initialized: bool,
    pub mode: Option<ServerMode>,
}
