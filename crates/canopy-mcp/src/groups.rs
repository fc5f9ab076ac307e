//! Tool group engine
//!
//! A group is a named subset view over the global tool catalog, exposed at
//! its own MCP endpoint. Each group keeps an in-memory exposed-tool map
//! derived from its inclusion/exclusion spec and the currently enabled
//! catalog, and reacts to catalog change events to stay in sync. Prompts
//! are not exposed through groups.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ServerHandler;

use canopy_store::{Database, GroupSpec, ToolGroupRecord};

use crate::catalog::CatalogService;
use crate::events::CatalogSubscriber;
use crate::naming::split_name;
use crate::proxy::{rpc_error, scope_from_context, ProxyIndex};
use crate::McpError;

struct GroupState {
    record: ToolGroupRecord,
    exposed: RwLock<HashMap<String, Tool>>,
}

/// Maintains group specs and their exposed tool sets
pub struct ToolGroupEngine {
    db: Database,
    index: Arc<ProxyIndex>,
    groups: RwLock<HashMap<String, Arc<GroupState>>>,
}

impl ToolGroupEngine {
    /// Load all persisted groups and compute their exposed sets
    pub async fn load(db: Database, index: Arc<ProxyIndex>) -> Result<Arc<Self>, McpError> {
        let engine = Arc::new(Self {
            db,
            index,
            groups: RwLock::new(HashMap::new()),
        });

        let records = engine.db.groups().list().await?;
        let count = records.len();
        {
            let mut groups = engine.groups.write().expect("group map poisoned");
            for record in records {
                let state = engine.build_state(record);
                groups.insert(state.record.name.clone(), state);
            }
        }

        tracing::info!(groups = count, "tool groups loaded");
        Ok(engine)
    }

    fn build_state(&self, record: ToolGroupRecord) -> Arc<GroupState> {
        let exposed = self
            .index
            .tool_names()
            .into_iter()
            .filter(|name| spec_includes(&record.spec, name))
            .filter_map(|name| self.index.tool(&name).map(|entry| (name, entry.tool)))
            .collect();

        Arc::new(GroupState {
            record,
            exposed: RwLock::new(exposed),
        })
    }

    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        spec: GroupSpec,
    ) -> Result<ToolGroupRecord, McpError> {
        validate_group_name(name)?;
        let record = self.db.groups().create(name, description, &spec).await?;

        let state = self.build_state(record.clone());
        self.groups.write().expect("group map poisoned").insert(name.to_string(), state);

        tracing::info!(group = name, "created tool group");
        Ok(record)
    }

    /// Replace a group's spec; the exposed set is swapped atomically
    pub async fn update_group(
        &self,
        name: &str,
        description: &str,
        spec: GroupSpec,
    ) -> Result<ToolGroupRecord, McpError> {
        let record = self.db.groups().update(name, description, &spec).await?;

        let state = self.build_state(record.clone());
        self.groups.write().expect("group map poisoned").insert(name.to_string(), state);

        tracing::info!(group = name, "updated tool group");
        Ok(record)
    }

    pub async fn delete_group(&self, name: &str) -> Result<(), McpError> {
        self.db.groups().delete(name).await?;
        self.groups.write().expect("group map poisoned").remove(name);
        tracing::info!(group = name, "deleted tool group");
        Ok(())
    }

    pub async fn get_group(&self, name: &str) -> Result<ToolGroupRecord, McpError> {
        Ok(self.db.groups().get_by_name(name).await?)
    }

    pub async fn list_groups(&self) -> Result<Vec<ToolGroupRecord>, McpError> {
        Ok(self.db.groups().list().await?)
    }

    /// Whether a group exists in the in-memory state
    pub fn group_exists(&self, name: &str) -> bool {
        self.groups.read().expect("group map poisoned").contains_key(name)
    }

    /// The tools a group currently exposes
    pub fn exposed_tools(&self, group_name: &str) -> Vec<Tool> {
        let Some(state) = self.state(group_name) else {
            return Vec::new();
        };
        let exposed = state.exposed.read().expect("exposed set poisoned").values().cloned().collect();
        exposed
    }

    /// Whether a group currently exposes the given canonical tool name
    pub fn exposes_tool(&self, group_name: &str, canonical_name: &str) -> bool {
        self.state(group_name)
            .is_some_and(|state| state.exposed.read().expect("exposed set poisoned").contains_key(canonical_name))
    }

    fn state(&self, group_name: &str) -> Option<Arc<GroupState>> {
        self.groups.read().expect("group map poisoned").get(group_name).cloned()
    }
}

impl CatalogSubscriber for ToolGroupEngine {
    fn on_items_added(&self, name: &str) -> Result<(), McpError> {
        let Some(entry) = self.index.tool(name) else {
            // The tool vanished between the event and this callback
            return Ok(());
        };

        let groups = self.groups.read().expect("group map poisoned");
        for state in groups.values() {
            if spec_includes(&state.record.spec, name) {
                state
                    .exposed
                    .write()
                    .expect("exposed set poisoned")
                    .insert(name.to_string(), entry.tool.clone());
            }
        }
        Ok(())
    }

    fn on_items_removed(&self, names: &[String]) {
        let groups = self.groups.read().expect("group map poisoned");
        for state in groups.values() {
            let mut exposed = state.exposed.write().expect("exposed set poisoned");
            for name in names {
                exposed.remove(name);
            }
        }
    }
}

/// Whether a spec includes the given canonical tool name
///
/// Exclusions are removed last: an excluded tool stays out even when its
/// server is included wholesale.
fn spec_includes(spec: &GroupSpec, canonical_name: &str) -> bool {
    if spec.excluded_tools.iter().any(|excluded| excluded == canonical_name) {
        return false;
    }
    if spec.included_tools.iter().any(|included| included == canonical_name) {
        return true;
    }
    match split_name(canonical_name) {
        Some((server, _)) => spec.included_servers.iter().any(|included| included == server),
        None => false,
    }
}

/// Group names become URL path segments
fn validate_group_name(name: &str) -> Result<(), McpError> {
    if name.is_empty() {
        return Err(McpError::Validation("invalid group name: must not be empty".to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(McpError::Validation(format!(
            "invalid group name: '{name}' may only contain letters, numbers, hyphens, and underscores"
        )));
    }
    Ok(())
}

/// Handler serving one group's MCP endpoint
///
/// Exposes exactly the group's effective tool set, wired to the same call
/// path as the global proxy servers.
#[derive(Clone)]
pub struct GroupProxyHandler {
    catalog: Arc<CatalogService>,
    engine: Arc<ToolGroupEngine>,
    group_name: String,
}

impl GroupProxyHandler {
    pub fn new(catalog: Arc<CatalogService>, engine: Arc<ToolGroupEngine>, group_name: String) -> Self {
        Self {
            catalog,
            engine,
            group_name,
        }
    }
}

impl ServerHandler for GroupProxyHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: format!("canopy group {}", self.group_name),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let scope = scope_from_context(&context);
        let tools = self
            .engine
            .exposed_tools(&self.group_name)
            .into_iter()
            .filter(|tool| match split_name(&tool.name) {
                Some((server, _)) => scope.allows(server),
                None => false,
            })
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

        if !self.engine.exposes_tool(&self.group_name, &name) {
            return Err(ErrorData::invalid_params(
                format!("tool not found in group {}: {name}", self.group_name),
                None,
            ));
        }

        let result = self
            .catalog
            .invoke_tool(&name, request.arguments, &scope)
            .await
            .map_err(rpc_error)?;
        result.into_call_result().map_err(rpc_error)
    }
}
