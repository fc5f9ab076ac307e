//! The server-config singleton
//!
//! A single row records whether the gateway has been initialized and in
//! which mode. The mode is immutable for the lifetime of the database:
//! re-initializing with a different mode is a conflict.

use canopy_config::ServerMode;
use sqlx::AnyPool;

use crate::error::map_sqlx_error;
use crate::model::ServerConfigRecord;
use crate::StoreError;

const SINGLETON_ID: i64 = 1;

#[derive(sqlx::FromRow)]
struct ConfigRow {
    initialized: i64,
    mode: Option<String>,
}

/// Access to the initialization singleton
#[derive(Clone)]
pub struct ServerConfigRepository {
    pool: AnyPool,
}

impl ServerConfigRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Read the current state; an absent row means uninitialized
    pub async fn get(&self) -> Result<ServerConfigRecord, StoreError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT initialized, mode FROM server_config WHERE id = $1",
        )
        .bind(SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("server config", e))?;

        let Some(row) = row else {
            return Ok(ServerConfigRecord {
                initialized: false,
                mode: None,
            });
        };

        let mode = match row.mode.as_deref() {
            Some(raw) => Some(
                ServerMode::parse(raw)
                    .map_err(|e| StoreError::Internal(format!("corrupt server mode in store: {e}")))?,
            ),
            None => None,
        };

        Ok(ServerConfigRecord {
            initialized: row.initialized != 0,
            mode,
        })
    }

    /// Transition uninitialized → initialized(mode)
    ///
    /// Returns `true` when this call performed the transition, `false` when
    /// the store was already initialized in the same mode. Initializing in a
    /// different mode fails.
    pub async fn init(&self, mode: ServerMode) -> Result<bool, StoreError> {
        let current = self.get().await?;
        if current.initialized {
            return match current.mode {
                Some(existing) if existing == mode => Ok(false),
                existing => Err(StoreError::Conflict(format!(
                    "server is already initialized in {} mode",
                    existing.map_or("unknown", ServerMode::as_str)
                ))),
            };
        }

        sqlx::query("INSERT INTO server_config (id, initialized, mode) VALUES ($1, 1, $2)")
            .bind(SINGLETON_ID)
            .bind(mode.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("server config", e))?;

        Ok(true)
    }
}
