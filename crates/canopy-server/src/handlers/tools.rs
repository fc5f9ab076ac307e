//! Tool listing, invocation, and enablement

use axum::Json;
use axum::extract::{Query, State};
use canopy_mcp::types::ToolSummary;
use canopy_mcp::{AccessScope, ToolInvokeResult};
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    server: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ToolSummary>>, ApiError> {
    let tools = match query.server {
        Some(server) => state.catalog.list_tools_by_server(&server).await?,
        None => state.catalog.list_tools().await?,
    };
    Ok(Json(tools))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    name: String,
}

pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<GetQuery>,
) -> Result<Json<ToolSummary>, ApiError> {
    Ok(Json(state.catalog.get_tool(&query.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

pub async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<ToolInvokeResult>, ApiError> {
    let result = state
        .catalog
        .invoke_tool(&request.name, request.arguments, &AccessScope::unrestricted())
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    /// Canonical tool name, or a bare server name to affect all its tools
    name: String,
}

pub async fn enable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<EnableRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.enable_tools(&request.name).await?))
}

pub async fn disable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<EnableRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.disable_tools(&request.name).await?))
}
