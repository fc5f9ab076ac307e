//! Human user administration (enterprise mode)

use axum::Json;
use axum::extract::{Path, State};
use canopy_core::token::{generate_access_token, validate_access_token};
use canopy_mcp::McpError;
use canopy_store::{UserRecord, UserRole};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, CurrentUser, RequireEnterprise};
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    /// Operator-supplied token; generated when absent
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Serialize)]
pub struct UserView {
    username: String,
    role: &'static str,
}

impl From<&UserRecord> for UserView {
    fn from(record: &UserRecord) -> Self {
        Self {
            username: record.username.clone(),
            role: record.role.as_str(),
        }
    }
}

#[derive(Serialize)]
pub struct CreatedUser {
    username: String,
    role: &'static str,
    access_token: String,
}

/// Create a standard user; only the admin exists with the admin role
pub async fn create(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedUser>), ApiError> {
    if request.username.is_empty() {
        return Err(McpError::Validation("username must not be empty".to_string()).into());
    }

    let token = match request.access_token.filter(|t| !t.is_empty()) {
        Some(token) => {
            validate_access_token(&token).map_err(|e| McpError::Validation(format!("invalid access token: {e}")))?;
            token
        }
        None => generate_access_token(),
    };

    let record = state.db.users().create(&request.username, UserRole::User, &token).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedUser {
            username: record.username,
            role: record.role.as_str(),
            access_token: record.access_token,
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state.db.users().list().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub access_token: String,
}

pub async fn update(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Path(username): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    validate_access_token(&request.access_token)
        .map_err(|e| McpError::Validation(format!("invalid access token: {e}")))?;
    let record = state.db.users().update_token(&username, &request.access_token).await?;
    Ok(Json(UserView::from(&record)))
}

pub async fn delete(
    State(state): State<AppState>,
    _enterprise: RequireEnterprise,
    _admin: AdminUser,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = state.db.users().get_by_username(&username).await?;
    if user.role == UserRole::Admin {
        return Err(McpError::Forbidden("cannot delete an admin user".to_string()).into());
    }
    state.db.users().delete(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Echo the authenticated user
pub async fn whoami(_enterprise: RequireEnterprise, CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(UserView::from(&user))
}
