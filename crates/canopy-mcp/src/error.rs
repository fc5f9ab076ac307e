use canopy_core::HttpError;
use canopy_store::StoreError;
use http::StatusCode;
use thiserror::Error;

/// Gateway engine errors
#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed name, missing required field, invalid token or transport
    #[error("{0}")]
    Validation(String),

    /// Unknown server, tool, prompt, group, or user
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name at creation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection or handshake failure against an upstream server
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Upstream initialization exceeded the configured deadline
    #[error("initialization request to MCP server timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Missing or invalid access token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Token is valid but does not grant access to the target
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store or serialization failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for McpError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl HttpError for McpError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout { .. } => "upstream_timeout",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
