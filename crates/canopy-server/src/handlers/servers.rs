//! Upstream server administration

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use canopy_mcp::types::EnableDisableServerResult;
use canopy_mcp::RegisterServerInput;
use canopy_store::{McpServerRecord, UpstreamConfig};
use http::StatusCode;
use serde::Serialize;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::AppState;

/// A server as presented in listings
///
/// Bearer tokens and custom headers are omitted; only the admin-gated
/// `server_configs` endpoint exposes those.
#[derive(Serialize)]
pub struct ServerView {
    name: String,
    transport: &'static str,
    description: String,
    session_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    env: HashMap<String, String>,
}

impl ServerView {
    fn from_record(record: &McpServerRecord) -> Self {
        let (url, command, args, env) = match &record.config {
            UpstreamConfig::StreamableHttp(config) => (Some(config.url.clone()), None, Vec::new(), HashMap::new()),
            UpstreamConfig::Sse(config) => (Some(config.url.clone()), None, Vec::new(), HashMap::new()),
            UpstreamConfig::Stdio(config) => (
                None,
                Some(config.command.clone()),
                config.args.clone(),
                config.env.clone(),
            ),
        };
        Self {
            name: record.name.clone(),
            transport: record.transport().as_str(),
            description: record.description.clone(),
            session_mode: record.session_mode.as_str(),
            url,
            command,
            args,
            env,
        }
    }
}

/// Full per-server configuration, including secrets
#[derive(Serialize)]
pub struct ServerConfigView {
    name: String,
    description: String,
    session_mode: &'static str,
    #[serde(flatten)]
    config: UpstreamConfig,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ServerView>>, ApiError> {
    let servers = state.catalog.list_servers().await?;
    Ok(Json(servers.iter().map(ServerView::from_record).collect()))
}

pub async fn register(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<RegisterServerInput>,
) -> Result<(StatusCode, Json<ServerView>), ApiError> {
    let record = state.catalog.register_server(input).await?;
    Ok((StatusCode::CREATED, Json(ServerView::from_record(&record))))
}

pub async fn deregister(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.deregister_server(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn enable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<EnableDisableServerResult>, ApiError> {
    Ok(Json(state.catalog.set_server_enabled(&name, true).await?))
}

pub async fn disable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<EnableDisableServerResult>, ApiError> {
    Ok(Json(state.catalog.set_server_enabled(&name, false).await?))
}

/// Admin-only: full transport configs, bearer tokens and headers included
pub async fn server_configs(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<ServerConfigView>>, ApiError> {
    let servers = state.catalog.list_servers().await?;
    Ok(Json(
        servers
            .into_iter()
            .map(|record| ServerConfigView {
                name: record.name,
                description: record.description,
                session_mode: record.session_mode.as_str(),
                config: record.config,
            })
            .collect(),
    ))
}
