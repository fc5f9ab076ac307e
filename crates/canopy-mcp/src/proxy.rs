//! Proxy MCP servers
//!
//! Two proxy instances are exposed: one speaking streamable HTTP (tools of
//! stdio and streamable_http upstreams) and one speaking SSE (tools of sse
//! upstreams, kept separate because SSE exists for backward compatibility
//! only). Both read from the shared [`ProxyIndex`], which the catalog
//! service mutates in place as registrations change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorData, GetPromptRequestParam, GetPromptResult,
    Implementation, JsonObject, ListPromptsResult, ListToolsResult, PaginatedRequestParam, Prompt,
    PromptArgument, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ServerHandler;

use canopy_core::HttpError as _;
use canopy_store::{PromptRecord, ToolRecord, TransportKind};

use crate::catalog::CatalogService;
use crate::naming::merge_names;
use crate::McpError;

/// Which proxy MCP server a tool belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// Served on `/mcp`; upstreams with stdio or streamable_http transport
    Streamable,
    /// Served on `/sse` + `/message`; upstreams with sse transport
    Sse,
}

impl TransportClass {
    pub fn for_transport(transport: TransportKind) -> Self {
        match transport {
            TransportKind::Sse => Self::Sse,
            TransportKind::Stdio | TransportKind::StreamableHttp => Self::Streamable,
        }
    }
}

/// A tool instance tracked in memory under its canonical name
#[derive(Clone)]
pub struct IndexedTool {
    pub tool: Tool,
    pub class: TransportClass,
    pub server: String,
}

/// A prompt instance tracked in memory under its canonical name
#[derive(Clone)]
pub struct IndexedPrompt {
    pub prompt: Prompt,
    pub class: TransportClass,
    pub server: String,
}

/// In-memory catalog exposed by the proxy MCP servers
///
/// Tolerates concurrent add/remove while requests are being served: a
/// request racing a removal either completes against the pre-removal state
/// or fails with a not-found error.
#[derive(Default)]
pub struct ProxyIndex {
    tools: RwLock<HashMap<String, IndexedTool>>,
    prompts: RwLock<HashMap<String, IndexedPrompt>>,
}

impl ProxyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool(&self, server: &str, class: TransportClass, tool: Tool) {
        let name = tool.name.to_string();
        self.tools.write().expect("tool index poisoned").insert(
            name,
            IndexedTool {
                tool,
                class,
                server: server.to_string(),
            },
        );
    }

    pub fn remove_tools(&self, names: &[String]) {
        let mut tools = self.tools.write().expect("tool index poisoned");
        for name in names {
            tools.remove(name);
        }
    }

    pub fn tool(&self, name: &str) -> Option<IndexedTool> {
        self.tools.read().expect("tool index poisoned").get(name).cloned()
    }

    pub fn tools_for_class(&self, class: TransportClass) -> Vec<IndexedTool> {
        self.tools
            .read()
            .expect("tool index poisoned")
            .values()
            .filter(|entry| entry.class == class)
            .cloned()
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.read().expect("tool index poisoned").keys().cloned().collect()
    }

    pub fn add_prompt(&self, server: &str, class: TransportClass, prompt: Prompt) {
        let name = prompt.name.clone();
        self.prompts.write().expect("prompt index poisoned").insert(
            name,
            IndexedPrompt {
                prompt,
                class,
                server: server.to_string(),
            },
        );
    }

    pub fn remove_prompts(&self, names: &[String]) {
        let mut prompts = self.prompts.write().expect("prompt index poisoned");
        for name in names {
            prompts.remove(name);
        }
    }

    pub fn prompt(&self, name: &str) -> Option<IndexedPrompt> {
        self.prompts.read().expect("prompt index poisoned").get(name).cloned()
    }

    pub fn prompts_for_class(&self, class: TransportClass) -> Vec<IndexedPrompt> {
        self.prompts
            .read()
            .expect("prompt index poisoned")
            .values()
            .filter(|entry| entry.class == class)
            .cloned()
            .collect()
    }
}

/// Build the in-memory tool instance for a stored record
pub(crate) fn tool_instance(server_name: &str, record: &ToolRecord) -> Tool {
    let schema: JsonObject = match &record.input_schema {
        serde_json::Value::Object(map) => map.clone(),
        _ => JsonObject::new(),
    };

    let mut tool = Tool::new(
        merge_names(server_name, &record.name),
        record.description.clone(),
        Arc::new(schema),
    );

    if let Some(raw) = &record.annotations {
        match serde_json::from_value::<ToolAnnotations>(raw.clone()) {
            Ok(annotations) => tool.annotations = Some(annotations),
            // Annotations are optional hints; a bad blob is not fatal
            Err(e) => tracing::warn!(tool = %record.name, error = %e, "discarding unreadable tool annotations"),
        }
    }

    tool
}

/// Build the in-memory prompt instance for a stored record
pub(crate) fn prompt_instance(server_name: &str, record: &PromptRecord) -> Prompt {
    let arguments = if record.arguments.is_empty() {
        None
    } else {
        serde_json::to_value(&record.arguments)
            .ok()
            .and_then(|value| serde_json::from_value::<Vec<PromptArgument>>(value).ok())
    };

    Prompt::new(
        merge_names(server_name, &record.name),
        Some(record.description.as_str()),
        arguments,
    )
}

/// Per-request authorization scope attached by the HTTP layer
///
/// `None` allow-list means unrestricted: development mode, or a human user
/// token. A client token carries its allow-list of upstream server names.
#[derive(Clone, Debug, Default)]
pub struct AccessScope {
    allow_list: Option<Arc<[String]>>,
}

impl AccessScope {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn for_client(allow_list: Vec<String>) -> Self {
        Self {
            allow_list: Some(allow_list.into()),
        }
    }

    /// Whether this scope may reach the given upstream server
    pub fn allows(&self, server_name: &str) -> bool {
        match &self.allow_list {
            None => true,
            Some(list) => list.iter().any(|entry| entry == "*" || entry == server_name),
        }
    }
}

/// Pull the authorization scope out of the MCP request context
///
/// The HTTP server transports attach the incoming request parts to the
/// request extensions; the auth middleware stores the scope there. Absent
/// either, the scope defaults to unrestricted, matching development mode.
pub(crate) fn scope_from_context(context: &RequestContext<RoleServer>) -> AccessScope {
    if let Some(scope) = context.extensions.get::<AccessScope>() {
        return scope.clone();
    }
    if let Some(parts) = context.extensions.get::<http::request::Parts>() {
        if let Some(scope) = parts.extensions.get::<AccessScope>() {
            return scope.clone();
        }
    }
    AccessScope::default()
}

/// Map engine errors onto JSON-RPC error payloads
pub(crate) fn rpc_error(error: McpError) -> ErrorData {
    use http::StatusCode;

    match error.status_code() {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ErrorData::invalid_params(error.client_message(), None),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorData::invalid_request(error.client_message(), None),
        _ => ErrorData::internal_error(error.client_message(), None),
    }
}

/// Handler serving one of the two global proxy MCP servers
#[derive(Clone)]
pub struct ProxyHandler {
    catalog: Arc<CatalogService>,
    class: TransportClass,
}

impl ProxyHandler {
    pub fn new(catalog: Arc<CatalogService>, class: TransportClass) -> Self {
        Self { catalog, class }
    }
}

impl ServerHandler for ProxyHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().enable_prompts().build(),
            server_info: Implementation {
                name: "canopy".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Canopy MCP gateway. Tools and prompts are addressed as <server>__<name>.".to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let scope = scope_from_context(&context);
        let tools = self
            .catalog
            .index()
            .tools_for_class(self.class)
            .into_iter()
            .filter(|entry| scope.allows(&entry.server))
            .map(|entry| entry.tool)
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let scope = scope_from_context(&context);
        let name = request.name.to_string();

        let Some(entry) = self.catalog.index().tool(&name) else {
            return Err(ErrorData::invalid_params(format!("tool not found: {name}"), None));
        };
        if entry.class != self.class {
            return Err(ErrorData::invalid_params(format!("tool not found: {name}"), None));
        }

        let result = self
            .catalog
            .invoke_tool(&name, request.arguments, &scope)
            .await
            .map_err(rpc_error)?;
        result.into_call_result().map_err(rpc_error)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        let scope = scope_from_context(&context);
        let prompts = self
            .catalog
            .index()
            .prompts_for_class(self.class)
            .into_iter()
            .filter(|entry| scope.allows(&entry.server))
            .map(|entry| entry.prompt)
            .collect();
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        let scope = scope_from_context(&context);
        let name = request.name.to_string();

        let Some(entry) = self.catalog.index().prompt(&name) else {
            return Err(ErrorData::invalid_params(format!("prompt not found: {name}"), None));
        };
        if entry.class != self.class {
            return Err(ErrorData::invalid_params(format!("prompt not found: {name}"), None));
        }

        self.catalog
            .get_prompt_with_args(&name, request.arguments, &scope)
            .await
            .map_err(rpc_error)
    }
}
