//! Upstream server records

use sqlx::{AnyPool, Row};

use crate::error::map_sqlx_error;
use crate::model::{McpServerRecord, SessionMode, UpstreamConfig};
use crate::{StoreError, TransportKind};

#[derive(sqlx::FromRow)]
struct ServerRow {
    id: i64,
    name: String,
    description: String,
    config: String,
    session_mode: String,
}

fn row_to_record(row: ServerRow) -> Result<McpServerRecord, StoreError> {
    let config: UpstreamConfig = serde_json::from_str(&row.config)
        .map_err(|e| StoreError::Internal(format!("corrupt config for server {}: {e}", row.name)))?;
    Ok(McpServerRecord {
        id: row.id,
        name: row.name,
        description: row.description,
        config,
        session_mode: SessionMode::parse(&row.session_mode)?,
    })
}

/// CRUD over registered upstream servers
#[derive(Clone)]
pub struct ServerRepository {
    pool: AnyPool,
}

impl ServerRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Insert a new server; the transport column is derived from the config
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        config: &UpstreamConfig,
        session_mode: SessionMode,
    ) -> Result<McpServerRecord, StoreError> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| StoreError::Internal(format!("failed to encode server config: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO mcp_servers (name, transport, description, config, session_mode)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(name)
        .bind(config.transport().as_str())
        .bind(description)
        .bind(&config_json)
        .bind(session_mode.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mcp server {name}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(McpServerRecord {
            id,
            name: name.to_string(),
            description: description.to_string(),
            config: config.clone(),
            session_mode,
        })
    }

    pub async fn get_by_name(&self, name: &str) -> Result<McpServerRecord, StoreError> {
        let row = sqlx::query_as::<_, ServerRow>(
            "SELECT id, name, description, config, session_mode FROM mcp_servers WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mcp server {name}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("mcp server {name}")))?;

        row_to_record(row)
    }

    pub async fn list(&self) -> Result<Vec<McpServerRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ServerRow>(
            "SELECT id, name, description, config, session_mode FROM mcp_servers ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mcp servers", e))?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Delete a server together with its tools and prompts in one transaction
    pub async fn delete_cascade(&self, server_id: i64) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Internal(format!("failed to begin transaction: {e}")))?;

        for statement in [
            "DELETE FROM tools WHERE server_id = $1",
            "DELETE FROM prompts WHERE server_id = $1",
            "DELETE FROM mcp_servers WHERE id = $1",
        ] {
            sqlx::query(statement)
                .bind(server_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("mcp server", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Internal(format!("failed to commit delete: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::StdioUpstreamConfig;
    use crate::test_db;

    fn stdio_config(command: &str) -> UpstreamConfig {
        UpstreamConfig::Stdio(StdioUpstreamConfig {
            command: command.to_string(),
            args: vec!["hi".to_string()],
            env: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn create_and_fetch_server() {
        let db = test_db().await;
        let repo = db.servers();

        let created = repo
            .create("fs", "filesystem tools", &stdio_config("echo"), SessionMode::Stateless)
            .await
            .unwrap();
        assert_eq!(created.transport(), TransportKind::Stdio);
        assert_eq!(created.session_mode, SessionMode::Stateless);

        let fetched = repo.get_by_name("fs").await.unwrap();
        assert_eq!(fetched.id, created.id);
        match fetched.config {
            UpstreamConfig::Stdio(ref c) => assert_eq!(c.command, "echo"),
            ref other => panic!("unexpected config: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() {
        let db = test_db().await;
        let repo = db.servers();

        repo.create("dup", "", &stdio_config("a"), SessionMode::Stateless)
            .await
            .unwrap();
        let err = repo
            .create("dup", "", &stdio_config("b"), SessionMode::Stateless)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_server_is_not_found() {
        let db = test_db().await;
        let err = db.servers().get_by_name("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cascade_delete_purges_tools_and_prompts() {
        let db = test_db().await;
        let servers = db.servers();
        let catalog = db.catalog();

        let server = servers
            .create("git", "", &stdio_config("git-mcp"), SessionMode::Stateless)
            .await
            .unwrap();
        catalog
            .insert_tool(server.id, "commit", "", &serde_json::json!({}), None)
            .await
            .unwrap();
        catalog.insert_prompt(server.id, "review", "", &[]).await.unwrap();

        servers.delete_cascade(server.id).await.unwrap();

        assert!(servers.get_by_name("git").await.unwrap_err().is_not_found());
        assert!(catalog.list_tools_by_server(server.id).await.unwrap().is_empty());
        assert!(catalog.list_prompts_by_server(server.id).await.unwrap().is_empty());
    }
}
