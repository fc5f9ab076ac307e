//! Liveness, metadata, metrics, and initialization handlers

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use canopy_config::ServerMode;
use canopy_mcp::McpError;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Serialize)]
pub struct ServerMetadata {
    version: String,
}

pub async fn metadata() -> Json<ServerMetadata> {
    Json(ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let Some(registry) = &state.metrics_registry else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match canopy_telemetry::encode_prometheus(registry) {
        Ok(body) => ([(http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Serialize)]
pub struct InitResponse {
    initialized: bool,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_access_token: Option<String>,
}

/// Bootstrap the server
///
/// In enterprise mode this creates the admin user; its access token is
/// returned here and never again.
pub async fn init(
    State(state): State<AppState>,
    body: Option<Json<InitRequest>>,
) -> Result<Json<InitResponse>, ApiError> {
    let request = body.map(|Json(body)| body).unwrap_or_default();

    let mode = match request.mode.as_deref() {
        None | Some("") => state.configured_mode,
        Some(raw) => ServerMode::parse(raw).map_err(|e| McpError::Validation(e.to_string()))?,
    };

    let admin = state.lifecycle.init(mode).await?;
    Ok(Json(InitResponse {
        initialized: true,
        mode: mode.as_str(),
        admin_access_token: admin.map(|user| user.access_token),
    }))
}
