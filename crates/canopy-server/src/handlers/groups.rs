//! Tool group administration

use axum::Json;
use axum::extract::{Path, State};
use canopy_store::{GroupSpec, ToolGroupRecord};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub included_tools: Vec<String>,
    #[serde(default)]
    pub included_servers: Vec<String>,
    #[serde(default)]
    pub excluded_tools: Vec<String>,
}

impl GroupInput {
    fn spec(&self) -> GroupSpec {
        GroupSpec {
            included_tools: self.included_tools.clone(),
            included_servers: self.included_servers.clone(),
            excluded_tools: self.excluded_tools.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct GroupView {
    name: String,
    description: String,
    included_tools: Vec<String>,
    included_servers: Vec<String>,
    excluded_tools: Vec<String>,
    endpoints: GroupEndpoints,
}

#[derive(Serialize)]
pub struct GroupEndpoints {
    streamable_http: String,
    sse: String,
}

impl GroupView {
    fn from_record(record: ToolGroupRecord) -> Self {
        let endpoints = GroupEndpoints {
            streamable_http: format!("/v0/groups/{}/mcp", record.name),
            sse: format!("/v0/groups/{}/sse", record.name),
        };
        Self {
            name: record.name,
            description: record.description,
            included_tools: record.spec.included_tools,
            included_servers: record.spec.included_servers,
            excluded_tools: record.spec.excluded_tools,
            endpoints,
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(input): Json<GroupInput>,
) -> Result<(StatusCode, Json<GroupView>), ApiError> {
    let spec = input.spec();
    let record = state.engine.create_group(&input.name, &input.description, spec).await?;
    Ok((StatusCode::CREATED, Json(GroupView::from_record(record))))
}

pub async fn get(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<Json<GroupView>, ApiError> {
    let record = state.engine.get_group(&name).await?;
    Ok(Json(GroupView::from_record(record)))
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<GroupView>>, ApiError> {
    let records = state.engine.list_groups().await?;
    Ok(Json(records.into_iter().map(GroupView::from_record).collect()))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
    Json(input): Json<GroupInput>,
) -> Result<Json<GroupView>, ApiError> {
    let spec = input.spec();
    let record = state.engine.update_group(&name, &input.description, spec).await?;
    Ok(Json(GroupView::from_record(record)))
}

pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_group(&name).await?;
    state.group_endpoints.remove(&name);
    Ok(StatusCode::NO_CONTENT)
}
