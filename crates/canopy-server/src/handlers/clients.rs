//! MCP client administration (enterprise mode)

use axum::Json;
use axum::extract::{Path, State};
use canopy_core::token::{generate_access_token, validate_access_token};
use canopy_mcp::McpError;
use canopy_store::McpClientRecord;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, RequireEnterprise};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Upstream server names this client may call; `"*"` grants all
    #[serde(default)]
    pub allow_list: Vec<String>,
    /// Operator-supplied token; generated when absent
    #[serde(default)]
    pub access_token: Option<String>,
}

/// A client as listed; the access token is only returned at creation
#[derive(Serialize)]
pub struct ClientView {
    name: String,
    description: String,
    allow_list: Vec<String>,
    is_custom_access_token: bool,
}

impl From<McpClientRecord> for ClientView {
    fn from(record: McpClientRecord) -> Self {
        Self {
            name: record.name,
            description: record.description,
            allow_list: record.allow_list,
            is_custom_access_token: record.is_custom_access_token,
        }
    }
}

#[derive(Serialize)]
pub struct CreatedClient {
    name: String,
    description: String,
    allow_list: Vec<String>,
    access_token: String,
    is_custom_access_token: bool,
}

pub async fn create(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<CreatedClient>), ApiError> {
    let (token, is_custom) = match request.access_token.filter(|t| !t.is_empty()) {
        Some(token) => {
            validate_access_token(&token).map_err(|e| McpError::Validation(format!("invalid access token: {e}")))?;
            (token, true)
        }
        None => (generate_access_token(), false),
    };

    let record = state
        .db
        .clients()
        .create(&request.name, &request.description, &request.allow_list, &token, is_custom)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedClient {
            name: record.name,
            description: record.description,
            allow_list: record.allow_list,
            access_token: record.access_token,
            is_custom_access_token: record.is_custom_access_token,
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
) -> Result<Json<Vec<ClientView>>, ApiError> {
    let clients = state.db.clients().list().await?;
    Ok(Json(clients.into_iter().map(ClientView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub access_token: String,
}

pub async fn update(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Path(name): Path<String>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<ClientView>, ApiError> {
    validate_access_token(&request.access_token)
        .map_err(|e| McpError::Validation(format!("invalid access token: {e}")))?;
    let record = state.db.clients().update_token(&name, &request.access_token).await?;
    Ok(Json(record.into()))
}

/// Delete a client, revoking its access immediately; idempotent
pub async fn delete(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.db.clients().delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
