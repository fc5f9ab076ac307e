//! MCP client records
//!
//! Clients are agent applications (Claude, Cursor, ...) authorized to call
//! the MCP proxy in enterprise mode. The access token is the identity.

use sqlx::{AnyPool, Row};

use crate::error::map_sqlx_error;
use crate::model::McpClientRecord;
use crate::StoreError;

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: i64,
    name: String,
    description: String,
    allow_list: String,
    access_token: String,
    is_custom_access_token: i64,
}

fn row_to_record(row: ClientRow) -> Result<McpClientRecord, StoreError> {
    let allow_list = serde_json::from_str(&row.allow_list)
        .map_err(|e| StoreError::Internal(format!("corrupt allow list for client {}: {e}", row.name)))?;
    Ok(McpClientRecord {
        id: row.id,
        name: row.name,
        description: row.description,
        allow_list,
        access_token: row.access_token,
        is_custom_access_token: row.is_custom_access_token != 0,
    })
}

const CLIENT_COLUMNS: &str = "id, name, description, allow_list, access_token, is_custom_access_token";

/// CRUD over MCP clients
#[derive(Clone)]
pub struct ClientRepository {
    pool: AnyPool,
}

impl ClientRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        allow_list: &[String],
        access_token: &str,
        is_custom_access_token: bool,
    ) -> Result<McpClientRecord, StoreError> {
        let allow_json = serde_json::to_string(allow_list)
            .map_err(|e| StoreError::Internal(format!("failed to encode allow list: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO mcp_clients (name, description, allow_list, access_token, is_custom_access_token)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(&allow_json)
        .bind(access_token)
        .bind(i64::from(is_custom_access_token))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mcp client {name}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(McpClientRecord {
            id,
            name: name.to_string(),
            description: description.to_string(),
            allow_list: allow_list.to_vec(),
            access_token: access_token.to_string(),
            is_custom_access_token,
        })
    }

    pub async fn list(&self) -> Result<Vec<McpClientRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM mcp_clients ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mcp clients", e))?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<McpClientRecord, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM mcp_clients WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mcp client {name}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("mcp client {name}")))?;
        row_to_record(row)
    }

    pub async fn get_by_token(&self, token: &str) -> Result<McpClientRecord, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM mcp_clients WHERE access_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mcp client", e))?
        .ok_or_else(|| StoreError::NotFound("mcp client".to_string()))?;
        row_to_record(row)
    }

    /// Rotate a client's access token
    pub async fn update_token(&self, name: &str, access_token: &str) -> Result<McpClientRecord, StoreError> {
        let result = sqlx::query(
            "UPDATE mcp_clients SET access_token = $1, is_custom_access_token = 1 WHERE name = $2",
        )
        .bind(access_token)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("mcp client {name}"), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("mcp client {name}")));
        }
        self.get_by_name(name).await
    }

    /// Delete a client, revoking its access; idempotent on a missing name
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM mcp_clients WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("mcp client {name}"), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;

    #[tokio::test]
    async fn create_and_look_up_by_token() {
        let db = test_db().await;
        let repo = db.clients();

        repo.create("cursor", "", &["calc".to_string()], "token-abc123", true)
            .await
            .unwrap();

        let by_token = repo.get_by_token("token-abc123").await.unwrap();
        assert_eq!(by_token.name, "cursor");
        assert!(by_token.is_custom_access_token);
        assert!(by_token.allows("calc"));
        assert!(!by_token.allows("github"));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let db = test_db().await;
        assert!(db.clients().get_by_token("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let db = test_db().await;
        let repo = db.clients();

        repo.create("gone", "", &[], "token-xyz789", false).await.unwrap();
        repo.delete("gone").await.unwrap();
        // deleting again must not error
        repo.delete("gone").await.unwrap();
        assert!(repo.get_by_name("gone").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn token_rotation_marks_custom() {
        let db = test_db().await;
        let repo = db.clients();

        repo.create("claude", "", &["*".to_string()], "generated-token-1", false)
            .await
            .unwrap();
        let updated = repo.update_token("claude", "operator-token-2").await.unwrap();
        assert_eq!(updated.access_token, "operator-token-2");
        assert!(updated.is_custom_access_token);
        assert!(repo.get_by_token("generated-token-1").await.unwrap_err().is_not_found());
    }
}
