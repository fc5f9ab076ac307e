//! Access gate
//!
//! Authentication is middleware: the proxy endpoints accept either a user
//! or an MCP-client token and attach the resulting [`AccessScope`] to the
//! request; the admin API accepts user tokens only and attaches the
//! authenticated user. Authorization is done by extractors in the handlers
//! ([`AdminUser`], [`RequireEnterprise`]). In development mode every gate
//! is open.

use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use canopy_config::ServerMode;
use canopy_mcp::{AccessScope, McpError};
use canopy_store::{UserRecord, UserRole};
use http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

/// The authenticated user of an admin API request (enterprise mode)
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserRecord);

fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Reject requests until the server has been initialized
pub async fn require_initialized(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.lifecycle.is_initialized() {
        return ApiError(McpError::Unauthorized(
            "server is not initialized; call POST /init first".to_string(),
        ))
        .into_response();
    }
    next.run(request).await
}

/// Authenticate callers of the MCP proxy endpoints
///
/// Development mode attaches an unrestricted scope. Enterprise mode
/// requires a bearer token matching either a user (unrestricted) or an
/// MCP client (scoped to its allow-list).
pub async fn proxy_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let scope = match state.lifecycle.mode() {
        Some(ServerMode::Enterprise) => {
            let Some(token) = bearer_token(request.headers()) else {
                return ApiError(McpError::Unauthorized("missing bearer token".to_string())).into_response();
            };

            if state.db.users().get_by_token(token).await.is_ok() {
                AccessScope::unrestricted()
            } else if let Ok(client) = state.db.clients().get_by_token(token).await {
                AccessScope::for_client(client.allow_list)
            } else {
                return ApiError(McpError::Unauthorized("invalid access token".to_string())).into_response();
            }
        }
        _ => AccessScope::unrestricted(),
    };

    request.extensions_mut().insert(scope);
    next.run(request).await
}

/// Authenticate callers of the admin API
///
/// Enterprise mode requires a user token (MCP-client tokens are not valid
/// here) and attaches the user for downstream authorization.
pub async fn api_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if state.lifecycle.mode() == Some(ServerMode::Enterprise) {
        let Some(token) = bearer_token(request.headers()) else {
            return ApiError(McpError::Unauthorized("missing bearer token".to_string())).into_response();
        };
        match state.db.users().get_by_token(token).await {
            Ok(user) => {
                request.extensions_mut().insert(CurrentUser(user));
            }
            Err(_) => {
                return ApiError(McpError::Unauthorized("invalid access token".to_string())).into_response();
            }
        }
    }
    next.run(request).await
}

/// Extractor gating admin-only operations
///
/// Carries the admin record in enterprise mode; development mode has no
/// users, so the gate is open and the record absent.
pub struct AdminUser(pub Option<UserRecord>);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.lifecycle.mode() != Some(ServerMode::Enterprise) {
            return Ok(Self(None));
        }

        let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>().cloned() else {
            return Err(ApiError(McpError::Unauthorized("missing bearer token".to_string())));
        };
        if user.role != UserRole::Admin {
            return Err(ApiError(McpError::Forbidden(
                "this operation requires an admin user".to_string(),
            )));
        }
        Ok(Self(Some(user)))
    }
}

/// Extractor gating operations that only exist in enterprise mode
pub struct RequireEnterprise;

impl FromRequestParts<AppState> for RequireEnterprise {
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.lifecycle.mode() == Some(ServerMode::Enterprise) {
            Ok(Self)
        } else {
            Err(ApiError(McpError::Validation(
                "this operation is only available in enterprise mode".to_string(),
            )))
        }
    }
}

/// Extractor for the authenticated user (enterprise mode)
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError(McpError::Unauthorized("missing bearer token".to_string())))
    }
}
