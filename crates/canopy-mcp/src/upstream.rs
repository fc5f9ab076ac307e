//! Upstream session layer
//!
//! One [`UpstreamSession`] wraps a single initialized connection to an
//! upstream MCP server, whatever its transport. Initialization honors the
//! caller-supplied deadline; failures there are fatal to the session.
//! Errors on calls after initialization are returned to the caller without
//! closing the session.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, GetPromptRequestParam,
    GetPromptResult, Implementation, JsonObject, Prompt, ProtocolVersion, Tool,
};
use rmcp::service::{RoleClient, RunningService, ServiceError, ServiceExt as _};
use rmcp::transport::TokioChildProcess;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{Mutex, RwLock};

use canopy_store::{HttpUpstreamConfig, McpServerRecord, SseUpstreamConfig, StdioUpstreamConfig, UpstreamConfig};

use crate::naming::is_loopback_url;
use crate::McpError;

/// Client handler presented to upstream servers during the handshake
#[derive(Clone)]
pub struct GatewayClientHandler {
    info: ClientInfo,
}

impl GatewayClientHandler {
    fn new(name: &str, protocol_version: ProtocolVersion) -> Self {
        Self {
            info: ClientInfo {
                protocol_version,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: name.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                },
            },
        }
    }
}

impl rmcp::ClientHandler for GatewayClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

type ClientService = RunningService<RoleClient, GatewayClientHandler>;

/// How a call against an established session failed
#[derive(Debug)]
pub enum SessionFailure {
    /// The upstream rejected the request; the session remains usable
    Call(McpError),
    /// The transport failed; the session must be discarded
    Transport(McpError),
}

impl SessionFailure {
    pub fn into_error(self) -> McpError {
        match self {
            Self::Call(e) | Self::Transport(e) => e,
        }
    }
}

/// An initialized connection to one upstream MCP server
pub struct UpstreamSession {
    server_name: String,
    service: RwLock<Option<ClientService>>,
    /// Serializes calls on transports that cannot multiplex (stdio)
    call_gate: Option<Mutex<()>>,
}

impl UpstreamSession {
    /// Open and initialize a session to the given upstream
    pub async fn connect(record: &McpServerRecord, init_timeout: Duration) -> Result<Self, McpError> {
        let service = match &record.config {
            UpstreamConfig::Stdio(config) => connect_stdio(&record.name, config, init_timeout).await?,
            UpstreamConfig::StreamableHttp(config) => {
                connect_streamable_http(&record.name, config, init_timeout).await?
            }
            UpstreamConfig::Sse(config) => connect_sse(&record.name, config, init_timeout).await?,
        };

        tracing::debug!(server = %record.name, transport = record.transport().as_str(), "connected to upstream MCP server");

        let call_gate = matches!(record.config, UpstreamConfig::Stdio(_)).then(|| Mutex::new(()));

        Ok(Self {
            server_name: record.name.clone(),
            service: RwLock::new(Some(service)),
            call_gate,
        })
    }

    /// List all tools advertised by the upstream
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let guard = self.service.read().await;
        let service = guard.as_ref().ok_or_else(|| self.closed_error())?;
        service
            .list_all_tools()
            .await
            .map_err(|e| McpError::Upstream(format!("failed to fetch tools from MCP server {}: {e}", self.server_name)))
    }

    /// List all prompts advertised by the upstream
    ///
    /// Servers without prompt capability respond with a protocol error;
    /// that is treated as an empty prompt list.
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, McpError> {
        let guard = self.service.read().await;
        let service = guard.as_ref().ok_or_else(|| self.closed_error())?;
        match service.list_all_prompts().await {
            Ok(prompts) => Ok(prompts),
            Err(ServiceError::McpError(_)) => Ok(Vec::new()),
            Err(e) => Err(McpError::Upstream(format!(
                "failed to fetch prompts from MCP server {}: {e}",
                self.server_name
            ))),
        }
    }

    /// Invoke a tool by its short name
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, SessionFailure> {
        let _gate = match &self.call_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let guard = self.service.read().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| SessionFailure::Transport(self.closed_error()))?;

        service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| self.classify(&format!("tool {name}"), e))
    }

    /// Render a prompt by its short name
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<GetPromptResult, SessionFailure> {
        let _gate = match &self.call_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let guard = self.service.read().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| SessionFailure::Transport(self.closed_error()))?;

        service
            .get_prompt(GetPromptRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| self.classify(&format!("prompt {name}"), e))
    }

    /// Tear the session down; idempotent
    ///
    /// For stdio upstreams this terminates the child process. Waits for
    /// in-flight calls to finish before cancelling.
    pub async fn close(&self) {
        let service = self.service.write().await.take();
        if let Some(service) = service {
            if let Err(e) = service.cancel().await {
                tracing::debug!(server = %self.server_name, error = %e, "error while closing upstream session");
            }
        }
    }

    fn closed_error(&self) -> McpError {
        McpError::Upstream(format!("session to MCP server {} is closed", self.server_name))
    }

    fn classify(&self, what: &str, e: ServiceError) -> SessionFailure {
        match e {
            // A JSON-RPC error means the upstream processed the request;
            // the session itself is healthy.
            ServiceError::McpError(data) => SessionFailure::Call(McpError::Upstream(format!(
                "{what} failed on MCP server {}: {}",
                self.server_name, data.message
            ))),
            other => SessionFailure::Transport(McpError::Upstream(format!(
                "{what} failed on MCP server {}: {other}",
                self.server_name
            ))),
        }
    }
}

async fn connect_stdio(
    server_name: &str,
    config: &StdioUpstreamConfig,
    init_timeout: Duration,
) -> Result<ClientService, McpError> {
    let mut cmd = tokio::process::Command::new(&config.command);
    cmd.args(&config.args);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    let (transport, stderr) = TokioChildProcess::builder(cmd)
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| McpError::Upstream(format!("failed to spawn process for MCP server {server_name}: {e}")))?;

    if let Some(stderr) = stderr {
        spawn_stderr_pump(server_name.to_string(), stderr);
    }

    let handler = GatewayClientHandler::new(&format!("canopy mcp client for {server_name}"), ProtocolVersion::LATEST);
    initialize(server_name, handler, transport, init_timeout).await
}

async fn connect_streamable_http(
    server_name: &str,
    config: &HttpUpstreamConfig,
    init_timeout: Duration,
) -> Result<ClientService, McpError> {
    use rmcp::transport::StreamableHttpClientTransport;
    use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;

    let client = build_http_client(server_name, config.bearer_token.as_deref(), &config.headers)?;
    let transport_config = StreamableHttpClientTransportConfig::with_uri(config.url.as_str());
    let transport = StreamableHttpClientTransport::with_client(client, transport_config);

    let handler =
        GatewayClientHandler::new(&format!("canopy mcp client for {}", config.url), ProtocolVersion::LATEST);
    initialize(server_name, handler, transport, init_timeout)
        .await
        .map_err(|e| augment_loopback_hint(e, &config.url))
}

async fn connect_sse(
    server_name: &str,
    config: &SseUpstreamConfig,
    init_timeout: Duration,
) -> Result<ClientService, McpError> {
    use rmcp::transport::SseClientTransport;
    use rmcp::transport::sse_client::SseClientConfig;

    let client = build_http_client(server_name, config.bearer_token.as_deref(), &HashMap::new())?;
    let sse_config = SseClientConfig {
        sse_endpoint: std::sync::Arc::from(config.url.as_str()),
        ..Default::default()
    };

    // The SSE transport opens its event stream before the MCP handshake
    let transport = SseClientTransport::start_with_client(client, sse_config)
        .await
        .map_err(|e| {
            augment_loopback_hint(
                McpError::Upstream(format!("failed to start SSE transport for MCP server {server_name}: {e}")),
                &config.url,
            )
        })?;

    // SSE is kept for legacy MCP clients, which speak the 2024-11-05 revision
    let handler = GatewayClientHandler::new("canopy-sse-proxy-client", ProtocolVersion::V_2024_11_05);
    initialize(server_name, handler, transport, init_timeout)
        .await
        .map_err(|e| augment_loopback_hint(e, &config.url))
}

async fn initialize<T, E, A>(
    server_name: &str,
    handler: GatewayClientHandler,
    transport: T,
    init_timeout: Duration,
) -> Result<ClientService, McpError>
where
    T: rmcp::transport::IntoTransport<RoleClient, E, A>,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(init_timeout, handler.serve(transport)).await {
        Ok(Ok(service)) => Ok(service),
        Ok(Err(e)) => Err(McpError::Upstream(format!(
            "failed to initialize connection with MCP server {server_name}: {e}"
        ))),
        Err(_) => Err(McpError::Timeout {
            seconds: init_timeout.as_secs(),
        }),
    }
}

/// Build an HTTP client carrying the upstream's auth header set
///
/// Custom headers are merged over a bearer-derived `Authorization` header.
/// When both a bearer token and a custom `Authorization` header are
/// configured, the custom header wins.
fn build_http_client(
    server_name: &str,
    bearer_token: Option<&str>,
    headers: &HashMap<String, String>,
) -> Result<reqwest::Client, McpError> {
    let mut header_map = HeaderMap::new();

    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::Validation(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpError::Validation(format!("invalid value for header '{key}': {e}")))?;
        header_map.insert(name, value);
    }

    if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
        if header_map.contains_key(AUTHORIZATION) {
            tracing::info!(
                server = server_name,
                "custom Authorization header will be used; bearer_token ignored"
            );
        } else {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| McpError::Validation(format!("invalid bearer token: {e}")))?;
            header_map.insert(AUTHORIZATION, value);
        }
    }

    reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .map_err(|e| McpError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Attach the Docker networking hint to connection-refused loopback errors
fn augment_loopback_hint(error: McpError, url: &str) -> McpError {
    let McpError::Upstream(message) = &error else {
        return error;
    };
    let refused = message.to_ascii_lowercase().contains("connection refused")
        || message.contains("ECONNREFUSED");
    if refused && is_loopback_url(url) {
        return McpError::Upstream(format!(
            "connection to the MCP server {url} was refused. \
             If canopy is running inside Docker, use 'host.docker.internal' as your MCP server's hostname"
        ));
    }
    error
}

/// Mirror an upstream's stderr into the gateway log
///
/// Runs until EOF or a closed descriptor. Other read errors are logged and
/// end the pump without touching the session.
fn spawn_stderr_pump(server_name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::info!(server = %server_name, "[upstream stderr] {line}");
                }
                Ok(None) => {
                    tracing::debug!(server = %server_name, "upstream process stderr closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(server = %server_name, error = %e, "error reading upstream stderr");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_hint_replaces_refused_errors() {
        let error = McpError::Upstream("transport error: Connection refused (os error 111)".to_string());
        let hinted = augment_loopback_hint(error, "http://localhost:9000/mcp");
        assert!(hinted.to_string().contains("host.docker.internal"));
    }

    #[test]
    fn loopback_hint_skips_remote_hosts() {
        let error = McpError::Upstream("transport error: Connection refused (os error 111)".to_string());
        let hinted = augment_loopback_hint(error, "https://example.com/mcp");
        assert!(!hinted.to_string().contains("host.docker.internal"));
    }

    #[test]
    fn loopback_hint_skips_other_errors() {
        let error = McpError::Upstream("handshake failed: bad response".to_string());
        let hinted = augment_loopback_hint(error, "http://127.0.0.1:9000/mcp");
        assert!(!hinted.to_string().contains("host.docker.internal"));
    }

    #[test]
    fn custom_authorization_header_wins_over_bearer() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Basic abc123".to_string());
        // Builds without error; the bearer token is ignored in favor of the
        // custom header, which is applied as a client default.
        build_http_client("srv", Some("ignored-token"), &headers).unwrap();
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let mut headers = HashMap::new();
        headers.insert("bad header\n".to_string(), "x".to_string());
        assert!(build_http_client("srv", None, &headers).is_err());
    }
}
