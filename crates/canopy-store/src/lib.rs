#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Registry persistence for the canopy gateway
//!
//! Backed by sqlx over the `Any` driver: the embedded single-file SQLite
//! store is the default, a Postgres store is selected by the connection
//! string. Schema migrations run when the pool is opened. All deletes are
//! hard deletes.

mod clients;
mod error;
mod groups;
mod migrate;
mod model;
mod server_config;
mod servers;
mod tools;
mod users;

pub use clients::ClientRepository;
pub use error::StoreError;
pub use groups::GroupRepository;
pub use model::{
    GroupSpec, HttpUpstreamConfig, McpClientRecord, McpServerRecord, PromptArgument, PromptRecord,
    ServerConfigRecord, SessionMode, SseUpstreamConfig, StdioUpstreamConfig, ToolGroupRecord,
    ToolRecord, TransportKind, UpstreamConfig, UserRecord, UserRole,
};
pub use server_config::ServerConfigRepository;
pub use servers::ServerRepository;
pub use tools::CatalogRepository;
pub use users::UserRepository;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

/// Which SQL dialect the connection string selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Self::Postgres)
        } else {
            Err(StoreError::Internal(format!("unsupported database url scheme: {url}")))
        }
    }
}

/// Handle to the registry database
///
/// Cheap to clone; repositories borrow the shared pool.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Open the database and apply migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(database_url)?;

        // SQLite gets a single connection: writes serialize anyway, and an
        // in-memory database would otherwise fragment across connections.
        let max_connections = match dialect {
            Dialect::Sqlite => 1,
            Dialect::Postgres => 10,
        };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Internal(format!("failed to open database: {e}")))?;

        migrate::run(&pool, dialect).await?;
        tracing::info!(dialect = ?dialect, "registry database ready");

        Ok(Self { pool })
    }

    pub fn servers(&self) -> ServerRepository {
        ServerRepository::new(self.pool.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    pub fn groups(&self) -> GroupRepository {
        GroupRepository::new(self.pool.clone())
    }

    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn server_config(&self) -> ServerConfigRepository {
        ServerConfigRepository::new(self.pool.clone())
    }

    /// Close the underlying pool, releasing the database handle
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    Database::connect("sqlite::memory:").await.unwrap()
}
