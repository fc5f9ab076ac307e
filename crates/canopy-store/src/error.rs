use canopy_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Registry store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched the lookup
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Driver, serialization, or migration failure
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Map sqlx errors onto the store taxonomy
///
/// Unique violations surface differently per driver, so both the database
/// error code path and the SQLite message text are checked.
pub(crate) fn map_sqlx_error(what: &str, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::RowNotFound = e {
        return StoreError::NotFound(what.to_string());
    }
    if let sqlx::Error::Database(ref db) = e {
        let unique = db.is_unique_violation() || db.message().contains("UNIQUE constraint failed");
        if unique {
            return StoreError::Conflict(format!("{what} already exists"));
        }
    }
    StoreError::Internal(format!("{what}: {e}"))
}

impl HttpError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("not found: {what}"),
            Self::Conflict(msg) => msg.clone(),
            Self::Internal(_) => "internal storage error".to_string(),
        }
    }
}
