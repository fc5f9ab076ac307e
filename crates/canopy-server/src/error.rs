use axum::Json;
use axum::response::IntoResponse;
use canopy_core::HttpError;
use canopy_mcp::McpError;
use canopy_store::StoreError;

/// Error response wrapper that implements `IntoResponse`
pub struct ApiError(pub McpError);

impl From<McpError> for ApiError {
    fn from(e: McpError) -> Self {
        Self(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let body = serde_json::json!({
            "error": {
                "type": self.0.error_type(),
                "message": self.0.client_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}
