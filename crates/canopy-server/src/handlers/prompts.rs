//! Prompt listing, rendering, and enablement

use axum::Json;
use axum::extract::{Query, State};
use canopy_mcp::types::PromptSummary;
use canopy_mcp::AccessScope;
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
) -> Result<Json<Vec<PromptSummary>>, ApiError> {
    let prompts = match query.server {
        Some(server) => state.catalog.list_prompts_by_server(&server).await?,
        None => state.catalog.list_prompts().await?,
    };
    Ok(Json(prompts))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    name: String,
}

pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<GetQuery>,
) -> Result<Json<PromptSummary>, ApiError> {
    Ok(Json(state.catalog.get_prompt(&query.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Render a prompt and return the upstream's messages payload unchanged
pub async fn render(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .catalog
        .get_prompt_with_args(&request.name, request.arguments, &AccessScope::unrestricted())
        .await?;
    let value = serde_json::to_value(result)
        .map_err(|e| canopy_mcp::McpError::Internal(format!("failed to serialize prompt result: {e}")))?;
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    /// Canonical prompt name, or a bare server name to affect all its prompts
    name: String,
}

pub async fn enable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<EnableRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.enable_prompts(&request.name).await?))
}

pub async fn disable(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<EnableRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.disable_prompts(&request.name).await?))
}
