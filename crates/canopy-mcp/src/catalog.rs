//! Catalog service
//!
//! Coordinates the registry database, the proxy index, and upstream
//! sessions: it registers and deregisters upstream servers, imports their
//! catalogs, flips tools and prompts on and off, routes proxied calls, and
//! fans out change events to subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::model::{GetPromptResult, JsonObject};
use tokio::sync::Mutex;

use canopy_store::{Database, McpServerRecord, PromptArgument, PromptRecord, ToolRecord};
use canopy_telemetry::{ToolCallMetrics, ToolCallOutcome};

use crate::events::CatalogEvents;
use crate::naming::{merge_names, split_name, validate_server_name};
use crate::proxy::{prompt_instance, tool_instance, AccessScope, ProxyIndex, TransportClass};
use crate::session::SessionManager;
use crate::types::{
    EnableDisableServerResult, PromptSummary, RegisterServerInput, ToolInvokeResult, ToolSummary,
};
use crate::upstream::UpstreamSession;
use crate::McpError;

/// Coordinates registry, proxy index, and upstream sessions
pub struct CatalogService {
    db: Database,
    index: Arc<ProxyIndex>,
    sessions: Arc<SessionManager>,
    events: Arc<CatalogEvents>,
    metrics: ToolCallMetrics,
    init_timeout: Duration,
    /// Serializes structural catalog mutations; call-path lookups read the
    /// index and the store without taking it
    mutation_lock: Mutex<()>,
}

impl CatalogService {
    /// Build the service and load the proxy index from the database
    pub async fn new(
        db: Database,
        sessions: Arc<SessionManager>,
        events: Arc<CatalogEvents>,
        metrics: ToolCallMetrics,
        init_timeout: Duration,
    ) -> Result<Arc<Self>, McpError> {
        let service = Arc::new(Self {
            db,
            index: Arc::new(ProxyIndex::new()),
            sessions,
            events,
            metrics,
            init_timeout,
            mutation_lock: Mutex::new(()),
        });
        service.load_index().await?;
        Ok(service)
    }

    /// The in-memory catalog backing the proxy MCP servers
    pub fn index(&self) -> Arc<ProxyIndex> {
        Arc::clone(&self.index)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn load_index(&self) -> Result<(), McpError> {
        let servers = self.db.servers().list().await?;
        let mut tool_count = 0usize;
        let mut prompt_count = 0usize;

        for server in &servers {
            let class = TransportClass::for_transport(server.transport());
            for tool in self.db.catalog().list_tools_by_server(server.id).await? {
                if tool.enabled {
                    self.index.add_tool(&server.name, class, tool_instance(&server.name, &tool));
                    tool_count += 1;
                }
            }
            for prompt in self.db.catalog().list_prompts_by_server(server.id).await? {
                if prompt.enabled {
                    self.index.add_prompt(&server.name, class, prompt_instance(&server.name, &prompt));
                    prompt_count += 1;
                }
            }
        }

        tracing::info!(
            servers = servers.len(),
            tools = tool_count,
            prompts = prompt_count,
            "proxy catalog loaded"
        );
        Ok(())
    }

    // ── Server registration ────────────────────────────────────────────

    /// Register an upstream server and import its catalog
    ///
    /// The upstream must be reachable: if the session cannot be opened, the
    /// registration is aborted and nothing is persisted. Individual items
    /// that fail to persist are logged and skipped; the proxy index only
    /// receives items that were stored.
    pub async fn register_server(&self, input: RegisterServerInput) -> Result<McpServerRecord, McpError> {
        let (name, description, config, session_mode) = input.into_parts()?;
        let _guard = self.mutation_lock.lock().await;

        if self.db.servers().get_by_name(&name).await.is_ok() {
            return Err(McpError::Conflict(format!("mcp server {name} already exists")));
        }

        // Dial the upstream before touching the database
        let probe = McpServerRecord {
            id: 0,
            name: name.clone(),
            description: description.clone(),
            config: config.clone(),
            session_mode,
        };
        let session = UpstreamSession::connect(&probe, self.init_timeout).await?;

        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };
        let prompts = match session.list_prompts().await {
            Ok(prompts) => prompts,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        let record = match self.db.servers().create(&name, &description, &config, session_mode).await {
            Ok(record) => record,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };
        let class = TransportClass::for_transport(record.transport());

        let mut imported_tools = 0usize;
        for tool in tools {
            let short_name = tool.name.to_string();
            let canonical = merge_names(&record.name, &short_name);
            let description = tool.description.as_deref().unwrap_or_default().to_string();
            let schema = serde_json::Value::Object((*tool.input_schema).clone());
            let annotations = tool.annotations.as_ref().and_then(|a| serde_json::to_value(a).ok());

            match self
                .db
                .catalog()
                .insert_tool(record.id, &short_name, &description, &schema, annotations.as_ref())
                .await
            {
                Ok(stored) => {
                    self.index.add_tool(&record.name, class, tool_instance(&record.name, &stored));
                    self.events.publish_added(&canonical);
                    imported_tools += 1;
                }
                Err(e) => {
                    // One bad tool must not abort the whole registration
                    tracing::error!(tool = %canonical, error = %e, "failed to register tool, skipping");
                }
            }
        }

        let mut imported_prompts = 0usize;
        for prompt in prompts {
            let short_name = prompt.name.clone();
            let canonical = merge_names(&record.name, &short_name);
            let description = prompt.description.clone().unwrap_or_default();
            let arguments = convert_prompt_arguments(prompt.arguments.as_deref());

            match self
                .db
                .catalog()
                .insert_prompt(record.id, &short_name, &description, &arguments)
                .await
            {
                Ok(stored) => {
                    self.index.add_prompt(&record.name, class, prompt_instance(&record.name, &stored));
                    imported_prompts += 1;
                }
                Err(e) => {
                    tracing::error!(prompt = %canonical, error = %e, "failed to register prompt, skipping");
                }
            }
        }

        // The import session is always discarded; stateful servers get a
        // long-lived session lazily on first call.
        session.close().await;

        tracing::info!(
            server = %record.name,
            tools = imported_tools,
            prompts = imported_prompts,
            "registered upstream MCP server"
        );
        Ok(record)
    }

    /// Remove a server, its catalog, and any live session; idempotent
    pub async fn deregister_server(&self, name: &str) -> Result<(), McpError> {
        let _guard = self.mutation_lock.lock().await;

        let record = match self.db.servers().get_by_name(name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let tool_names: Vec<String> = self
            .db
            .catalog()
            .list_tools_by_server(record.id)
            .await?
            .iter()
            .map(|tool| merge_names(&record.name, &tool.name))
            .collect();
        let prompt_names: Vec<String> = self
            .db
            .catalog()
            .list_prompts_by_server(record.id)
            .await?
            .iter()
            .map(|prompt| merge_names(&record.name, &prompt.name))
            .collect();

        self.db.servers().delete_cascade(record.id).await?;

        self.index.remove_tools(&tool_names);
        self.index.remove_prompts(&prompt_names);
        self.sessions.invalidate(&record.name).await;
        self.events.publish_removed(&tool_names);

        tracing::info!(server = name, "deregistered upstream MCP server");
        Ok(())
    }

    pub async fn list_servers(&self) -> Result<Vec<McpServerRecord>, McpError> {
        Ok(self.db.servers().list().await?)
    }

    pub async fn get_server(&self, name: &str) -> Result<McpServerRecord, McpError> {
        validate_server_name(name)?;
        Ok(self.db.servers().get_by_name(name).await?)
    }

    // ── Enable / disable ───────────────────────────────────────────────

    /// Enable one tool (canonical name) or all tools of a server (bare name)
    pub async fn enable_tools(&self, entity: &str) -> Result<Vec<String>, McpError> {
        let _guard = self.mutation_lock.lock().await;
        self.set_tools_enabled(entity, true).await
    }

    /// Disable one tool (canonical name) or all tools of a server (bare name)
    pub async fn disable_tools(&self, entity: &str) -> Result<Vec<String>, McpError> {
        let _guard = self.mutation_lock.lock().await;
        self.set_tools_enabled(entity, false).await
    }

    pub async fn enable_prompts(&self, entity: &str) -> Result<Vec<String>, McpError> {
        let _guard = self.mutation_lock.lock().await;
        self.set_prompts_enabled(entity, true).await
    }

    pub async fn disable_prompts(&self, entity: &str) -> Result<Vec<String>, McpError> {
        let _guard = self.mutation_lock.lock().await;
        self.set_prompts_enabled(entity, false).await
    }

    /// Flip every tool and prompt of a server at once
    pub async fn set_server_enabled(&self, name: &str, enabled: bool) -> Result<EnableDisableServerResult, McpError> {
        validate_server_name(name)?;
        let _guard = self.mutation_lock.lock().await;

        let tools_affected = self.set_tools_enabled(name, enabled).await?;
        let prompts_affected = self.set_prompts_enabled(name, enabled).await?;

        if !enabled {
            self.sessions.invalidate(name).await;
        }

        Ok(EnableDisableServerResult {
            name: name.to_string(),
            tools_affected,
            prompts_affected,
        })
    }

    async fn set_tools_enabled(&self, entity: &str, enabled: bool) -> Result<Vec<String>, McpError> {
        // A name containing the separator addresses a single tool;
        // otherwise the entity is a server and all its tools are affected.
        if let Some((server_name, tool_name)) = split_name(entity) {
            let server = self.db.servers().get_by_name(server_name).await?;
            let tool = self.db.catalog().get_tool(server.id, tool_name).await?;

            if tool.enabled == enabled {
                return Ok(vec![entity.to_string()]);
            }

            self.db.catalog().set_tool_enabled(tool.id, enabled).await?;
            self.apply_tool_transition(&server, &tool, enabled);
            return Ok(vec![entity.to_string()]);
        }

        let server = self.db.servers().get_by_name(entity).await?;
        let tools = self.db.catalog().list_tools_by_server(server.id).await?;

        let mut changed = Vec::new();
        for tool in tools {
            if tool.enabled == enabled {
                continue;
            }
            self.db.catalog().set_tool_enabled(tool.id, enabled).await?;
            self.apply_tool_transition(&server, &tool, enabled);
            changed.push(merge_names(&server.name, &tool.name));
        }
        Ok(changed)
    }

    fn apply_tool_transition(&self, server: &McpServerRecord, tool: &ToolRecord, enabled: bool) {
        let canonical = merge_names(&server.name, &tool.name);
        let class = TransportClass::for_transport(server.transport());

        if enabled {
            let mut stored = tool.clone();
            stored.enabled = true;
            self.index.add_tool(&server.name, class, tool_instance(&server.name, &stored));
            self.events.publish_added(&canonical);
        } else {
            let names = vec![canonical];
            self.index.remove_tools(&names);
            self.events.publish_removed(&names);
        }
    }

    async fn set_prompts_enabled(&self, entity: &str, enabled: bool) -> Result<Vec<String>, McpError> {
        if let Some((server_name, prompt_name)) = split_name(entity) {
            let server = self.db.servers().get_by_name(server_name).await?;
            let prompt = self.db.catalog().get_prompt(server.id, prompt_name).await?;

            if prompt.enabled == enabled {
                return Ok(vec![entity.to_string()]);
            }

            self.db.catalog().set_prompt_enabled(prompt.id, enabled).await?;
            self.apply_prompt_transition(&server, &prompt, enabled);
            return Ok(vec![entity.to_string()]);
        }

        let server = self.db.servers().get_by_name(entity).await?;
        let prompts = self.db.catalog().list_prompts_by_server(server.id).await?;

        let mut changed = Vec::new();
        for prompt in prompts {
            if prompt.enabled == enabled {
                continue;
            }
            self.db.catalog().set_prompt_enabled(prompt.id, enabled).await?;
            self.apply_prompt_transition(&server, &prompt, enabled);
            changed.push(merge_names(&server.name, &prompt.name));
        }
        Ok(changed)
    }

    fn apply_prompt_transition(&self, server: &McpServerRecord, prompt: &PromptRecord, enabled: bool) {
        let canonical = merge_names(&server.name, &prompt.name);
        let class = TransportClass::for_transport(server.transport());

        if enabled {
            let mut stored = prompt.clone();
            stored.enabled = true;
            self.index.add_prompt(&server.name, class, prompt_instance(&server.name, &stored));
        } else {
            self.index.remove_prompts(&[canonical]);
        }
    }

    // ── Listing ────────────────────────────────────────────────────────

    /// All tools in the registry, under canonical names
    pub async fn list_tools(&self) -> Result<Vec<ToolSummary>, McpError> {
        let servers = self.db.servers().list().await?;
        let names_by_id: HashMap<i64, &str> =
            servers.iter().map(|server| (server.id, server.name.as_str())).collect();

        let mut summaries = Vec::new();
        for tool in self.db.catalog().list_tools().await? {
            let server_name = names_by_id.get(&tool.server_id).ok_or_else(|| {
                McpError::Internal(format!("tool {} references unknown server {}", tool.name, tool.server_id))
            })?;
            summaries.push(tool_summary(merge_names(server_name, &tool.name), &tool));
        }
        Ok(summaries)
    }

    pub async fn list_tools_by_server(&self, server_name: &str) -> Result<Vec<ToolSummary>, McpError> {
        let server = self.get_server(server_name).await?;
        let tools = self.db.catalog().list_tools_by_server(server.id).await?;
        Ok(tools
            .iter()
            .map(|tool| tool_summary(merge_names(&server.name, &tool.name), tool))
            .collect())
    }

    pub async fn get_tool(&self, name: &str) -> Result<ToolSummary, McpError> {
        let (server_name, tool_name) = split_name(name)
            .ok_or_else(|| McpError::Validation(format!("invalid tool name '{name}': missing '__' separator")))?;
        let server = self.db.servers().get_by_name(server_name).await?;
        let tool = self.db.catalog().get_tool(server.id, tool_name).await?;
        Ok(tool_summary(name.to_string(), &tool))
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptSummary>, McpError> {
        let servers = self.db.servers().list().await?;
        let names_by_id: HashMap<i64, &str> =
            servers.iter().map(|server| (server.id, server.name.as_str())).collect();

        let mut summaries = Vec::new();
        for prompt in self.db.catalog().list_prompts().await? {
            let server_name = names_by_id.get(&prompt.server_id).ok_or_else(|| {
                McpError::Internal(format!(
                    "prompt {} references unknown server {}",
                    prompt.name, prompt.server_id
                ))
            })?;
            summaries.push(prompt_summary(merge_names(server_name, &prompt.name), &prompt));
        }
        Ok(summaries)
    }

    pub async fn list_prompts_by_server(&self, server_name: &str) -> Result<Vec<PromptSummary>, McpError> {
        let server = self.get_server(server_name).await?;
        let prompts = self.db.catalog().list_prompts_by_server(server.id).await?;
        Ok(prompts
            .iter()
            .map(|prompt| prompt_summary(merge_names(&server.name, &prompt.name), prompt))
            .collect())
    }

    pub async fn get_prompt(&self, name: &str) -> Result<PromptSummary, McpError> {
        let (server_name, prompt_name) = split_name(name)
            .ok_or_else(|| McpError::Validation(format!("invalid prompt name '{name}': missing '__' separator")))?;
        let server = self.db.servers().get_by_name(server_name).await?;
        let prompt = self.db.catalog().get_prompt(server.id, prompt_name).await?;
        Ok(prompt_summary(name.to_string(), &prompt))
    }

    // ── Invocation ─────────────────────────────────────────────────────

    /// Invoke a tool by canonical name and return its result
    pub async fn invoke_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        scope: &AccessScope,
    ) -> Result<ToolInvokeResult, McpError> {
        let started = Instant::now();
        let (server_name, tool_name) = split_name(name)
            .ok_or_else(|| McpError::Validation(format!("invalid tool name '{name}': missing '__' separator")))?;

        if !scope.allows(server_name) {
            return Err(McpError::Forbidden(format!(
                "client is not allowed to access MCP server {server_name}"
            )));
        }

        let record = self.db.servers().get_by_name(server_name).await?;
        let result = self.sessions.call_tool(&record, tool_name, arguments).await;

        let outcome = if result.is_ok() {
            ToolCallOutcome::Success
        } else {
            ToolCallOutcome::Error
        };
        self.metrics.record_tool_call(server_name, tool_name, outcome, started.elapsed());

        ToolInvokeResult::from_call_result(&result?)
    }

    /// Render a prompt by canonical name with the given arguments
    pub async fn get_prompt_with_args(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        scope: &AccessScope,
    ) -> Result<GetPromptResult, McpError> {
        let (server_name, prompt_name) = split_name(name)
            .ok_or_else(|| McpError::Validation(format!("invalid prompt name '{name}': missing '__' separator")))?;

        if !scope.allows(server_name) {
            return Err(McpError::Forbidden(format!(
                "client is not allowed to access MCP server {server_name}"
            )));
        }

        let record = self.db.servers().get_by_name(server_name).await?;
        self.sessions.get_prompt(&record, prompt_name, arguments).await
    }
}

fn tool_summary(canonical_name: String, record: &ToolRecord) -> ToolSummary {
    ToolSummary {
        name: canonical_name,
        enabled: record.enabled,
        description: record.description.clone(),
        input_schema: record.input_schema.clone(),
        annotations: record.annotations.clone(),
    }
}

fn prompt_summary(canonical_name: String, record: &PromptRecord) -> PromptSummary {
    PromptSummary {
        name: canonical_name,
        enabled: record.enabled,
        description: record.description.clone(),
        arguments: record.arguments.clone(),
    }
}

fn convert_prompt_arguments(arguments: Option<&[rmcp::model::PromptArgument]>) -> Vec<PromptArgument> {
    arguments
        .unwrap_or_default()
        .iter()
        .map(|argument| PromptArgument {
            name: argument.name.clone(),
            description: argument.description.clone(),
            required: argument.required.unwrap_or(false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::events::CatalogSubscriber;
    use canopy_store::{SessionMode, StdioUpstreamConfig, UpstreamConfig};

    #[derive(Default)]
    struct EventCounter {
        added: AtomicUsize,
        removed: AtomicUsize,
    }

    impl CatalogSubscriber for EventCounter {
        fn on_items_added(&self, _name: &str) -> Result<(), McpError> {
            self.added.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_items_removed(&self, names: &[String]) {
            self.removed.fetch_add(names.len(), Ordering::SeqCst);
        }
    }

    struct Harness {
        db: Database,
        service: Arc<CatalogService>,
        events_seen: Arc<EventCounter>,
    }

    async fn harness() -> Harness {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let events = Arc::new(CatalogEvents::new());
        let events_seen = Arc::new(EventCounter::default());
        events.subscribe(events_seen.clone());

        let sessions = SessionManager::new(Duration::from_secs(1), None);
        let service = CatalogService::new(db.clone(), sessions, events, ToolCallMetrics::new(), Duration::from_secs(1))
            .await
            .unwrap();

        Harness {
            db,
            service,
            events_seen,
        }
    }

    async fn seed_server(db: &Database, name: &str, tools: &[&str]) -> i64 {
        let server = db
            .servers()
            .create(
                name,
                "",
                &UpstreamConfig::Stdio(StdioUpstreamConfig {
                    command: "cmd".to_string(),
                    args: vec![],
                    env: Default::default(),
                }),
                SessionMode::Stateless,
            )
            .await
            .unwrap();
        for tool in tools {
            db.catalog()
                .insert_tool(server.id, tool, "", &serde_json::json!({}), None)
                .await
                .unwrap();
        }
        server.id
    }

    #[tokio::test]
    async fn enabling_an_enabled_tool_is_a_noop() {
        let h = harness().await;
        seed_server(&h.db, "git", &["commit"]).await;
        // rebuild the index over the seeded rows
        h.service.load_index().await.unwrap();
        assert!(h.service.index.tool("git__commit").is_some());

        let affected = h.service.enable_tools("git__commit").await.unwrap();
        assert_eq!(affected, vec!["git__commit"]);
        assert_eq!(h.events_seen.added.load(Ordering::SeqCst), 0);
        assert!(h.service.index.tool("git__commit").is_some());
    }

    #[tokio::test]
    async fn disable_then_enable_round_trips() {
        let h = harness().await;
        seed_server(&h.db, "git", &["commit"]).await;
        h.service.load_index().await.unwrap();

        let affected = h.service.disable_tools("git__commit").await.unwrap();
        assert_eq!(affected, vec!["git__commit"]);
        assert!(h.service.index.tool("git__commit").is_none());
        assert_eq!(h.events_seen.removed.load(Ordering::SeqCst), 1);

        let affected = h.service.enable_tools("git__commit").await.unwrap();
        assert_eq!(affected, vec!["git__commit"]);
        assert!(h.service.index.tool("git__commit").is_some());
        assert_eq!(h.events_seen.added.load(Ordering::SeqCst), 1);

        // disabling twice reports the name but publishes nothing new
        h.service.disable_tools("git__commit").await.unwrap();
        let affected = h.service.disable_tools("git__commit").await.unwrap();
        assert_eq!(affected, vec!["git__commit"]);
        assert_eq!(h.events_seen.removed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_wide_disable_reports_only_transitions() {
        let h = harness().await;
        seed_server(&h.db, "time", &["now", "convert"]).await;
        h.service.load_index().await.unwrap();

        h.service.disable_tools("time__convert").await.unwrap();

        let mut affected = h.service.disable_tools("time").await.unwrap();
        affected.sort();
        assert_eq!(affected, vec!["time__now"]);
    }

    #[tokio::test]
    async fn deregistration_is_complete_and_idempotent() {
        let h = harness().await;
        seed_server(&h.db, "deepwiki", &["search", "read"]).await;
        h.service.load_index().await.unwrap();

        h.service.deregister_server("deepwiki").await.unwrap();

        let listed = h.service.list_tools().await.unwrap();
        assert!(listed.iter().all(|tool| !tool.name.starts_with("deepwiki__")));
        assert!(h.service.index.tool("deepwiki__search").is_none());
        assert!(h.service.index.tool("deepwiki__read").is_none());
        assert_eq!(h.events_seen.removed.load(Ordering::SeqCst), 2);

        // a second deregistration of the same name is a no-op
        h.service.deregister_server("deepwiki").await.unwrap();
    }

    #[tokio::test]
    async fn invoke_rejects_names_without_separator() {
        let h = harness().await;
        let err = h
            .service
            .invoke_tool("bare-name", None, &AccessScope::unrestricted())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Validation(_)));
    }

    #[tokio::test]
    async fn invoke_unknown_server_is_not_found() {
        let h = harness().await;
        let err = h
            .service
            .invoke_tool("nonexistent__x", None, &AccessScope::unrestricted())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_outside_allow_list_is_forbidden() {
        let h = harness().await;
        seed_server(&h.db, "github", &["star"]).await;

        let scope = AccessScope::for_client(vec!["calc".to_string()]);
        let err = h.service.invoke_tool("github__star", None, &scope).await.unwrap_err();
        assert!(matches!(err, McpError::Forbidden(_)));
    }

    #[tokio::test]
    async fn registration_aborts_when_upstream_is_unreachable() {
        let h = harness().await;
        let input = RegisterServerInput {
            name: "broken".to_string(),
            transport: "stdio".to_string(),
            command: Some("/nonexistent/canopy-test-binary".to_string()),
            ..Default::default()
        };

        let err = h.service.register_server(input).await.unwrap_err();
        assert!(matches!(err, McpError::Upstream(_) | McpError::Timeout { .. }));

        // nothing was persisted
        assert!(h.service.list_servers().await.unwrap().is_empty());
        assert!(h.service.list_tools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registration_rejects_duplicate_names_before_dialing() {
        let h = harness().await;
        seed_server(&h.db, "dup", &[]).await;

        let input = RegisterServerInput {
            name: "dup".to_string(),
            transport: "stdio".to_string(),
            command: Some("echo".to_string()),
            ..Default::default()
        };
        let err = h.service.register_server(input).await.unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }

    #[tokio::test]
    async fn registration_validates_server_names() {
        let h = harness().await;
        for bad in ["bad__name", "trailing_", ""] {
            let input = RegisterServerInput {
                name: bad.to_string(),
                transport: "stdio".to_string(),
                command: Some("echo".to_string()),
                ..Default::default()
            };
            assert!(
                matches!(h.service.register_server(input).await.unwrap_err(), McpError::Validation(_)),
                "{bad:?} should fail validation"
            );
        }
    }

    #[tokio::test]
    async fn listing_uses_canonical_names() {
        let h = harness().await;
        seed_server(&h.db, "git", &["commit"]).await;
        seed_server(&h.db, "time", &["now"]).await;

        let mut names: Vec<String> = h.service.list_tools().await.unwrap().into_iter().map(|t| t.name).collect();
        names.sort();
        assert_eq!(names, vec!["git__commit", "time__now"]);

        let tool = h.service.get_tool("git__commit").await.unwrap();
        assert_eq!(tool.name, "git__commit");
        assert!(tool.enabled);
    }
}
