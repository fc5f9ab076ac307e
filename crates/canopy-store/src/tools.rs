//! Tool and prompt rows
//!
//! Both entities share shape and naming rules; prompts carry an argument
//! list where tools carry a JSON input schema.

use sqlx::{AnyPool, Row};

use crate::error::map_sqlx_error;
use crate::model::{PromptArgument, PromptRecord, ToolRecord};
use crate::StoreError;

#[derive(sqlx::FromRow)]
struct ToolRow {
    id: i64,
    server_id: i64,
    name: String,
    description: String,
    input_schema: String,
    annotations: Option<String>,
    enabled: i64,
}

#[derive(sqlx::FromRow)]
struct PromptRow {
    id: i64,
    server_id: i64,
    name: String,
    description: String,
    arguments: String,
    enabled: i64,
}

fn tool_row_to_record(row: ToolRow) -> Result<ToolRecord, StoreError> {
    let input_schema = serde_json::from_str(&row.input_schema)
        .map_err(|e| StoreError::Internal(format!("corrupt input schema for tool {}: {e}", row.name)))?;
    let annotations = match row.annotations {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| StoreError::Internal(format!("corrupt annotations for tool {}: {e}", row.name)))?,
        None => None,
    };
    Ok(ToolRecord {
        id: row.id,
        server_id: row.server_id,
        name: row.name,
        description: row.description,
        input_schema,
        annotations,
        enabled: row.enabled != 0,
    })
}

fn prompt_row_to_record(row: PromptRow) -> Result<PromptRecord, StoreError> {
    let arguments = serde_json::from_str(&row.arguments)
        .map_err(|e| StoreError::Internal(format!("corrupt arguments for prompt {}: {e}", row.name)))?;
    Ok(PromptRecord {
        id: row.id,
        server_id: row.server_id,
        name: row.name,
        description: row.description,
        arguments,
        enabled: row.enabled != 0,
    })
}

const TOOL_COLUMNS: &str = "id, server_id, name, description, input_schema, annotations, enabled";
const PROMPT_COLUMNS: &str = "id, server_id, name, description, arguments, enabled";

/// Rows for imported tools and prompts
#[derive(Clone)]
pub struct CatalogRepository {
    pool: AnyPool,
}

impl CatalogRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn insert_tool(
        &self,
        server_id: i64,
        name: &str,
        description: &str,
        input_schema: &serde_json::Value,
        annotations: Option<&serde_json::Value>,
    ) -> Result<ToolRecord, StoreError> {
        let schema_json = input_schema.to_string();
        let annotations_json = annotations.map(ToString::to_string);

        let row = sqlx::query(
            "INSERT INTO tools (server_id, name, description, input_schema, annotations, enabled)
             VALUES ($1, $2, $3, $4, $5, 1) RETURNING id",
        )
        .bind(server_id)
        .bind(name)
        .bind(description)
        .bind(&schema_json)
        .bind(&annotations_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("tool {name}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(ToolRecord {
            id,
            server_id,
            name: name.to_string(),
            description: description.to_string(),
            input_schema: input_schema.clone(),
            annotations: annotations.cloned(),
            enabled: true,
        })
    }

    pub async fn insert_prompt(
        &self,
        server_id: i64,
        name: &str,
        description: &str,
        arguments: &[PromptArgument],
    ) -> Result<PromptRecord, StoreError> {
        let arguments_json = serde_json::to_string(arguments)
            .map_err(|e| StoreError::Internal(format!("failed to encode prompt arguments: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO prompts (server_id, name, description, arguments, enabled)
             VALUES ($1, $2, $3, $4, 1) RETURNING id",
        )
        .bind(server_id)
        .bind(name)
        .bind(description)
        .bind(&arguments_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("prompt {name}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(PromptRecord {
            id,
            server_id,
            name: name.to_string(),
            description: description.to_string(),
            arguments: arguments.to_vec(),
            enabled: true,
        })
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ToolRow>(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools ORDER BY server_id, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("tools", e))?;
        rows.into_iter().map(tool_row_to_record).collect()
    }

    pub async fn list_tools_by_server(&self, server_id: i64) -> Result<Vec<ToolRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ToolRow>(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools WHERE server_id = $1 ORDER BY name"
        ))
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("tools", e))?;
        rows.into_iter().map(tool_row_to_record).collect()
    }

    pub async fn get_tool(&self, server_id: i64, name: &str) -> Result<ToolRecord, StoreError> {
        let row = sqlx::query_as::<_, ToolRow>(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools WHERE server_id = $1 AND name = $2"
        ))
        .bind(server_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("tool {name}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("tool {name}")))?;
        tool_row_to_record(row)
    }

    pub async fn set_tool_enabled(&self, tool_id: i64, enabled: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE tools SET enabled = $1 WHERE id = $2")
            .bind(i64::from(enabled))
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("tool", e))?;
        Ok(())
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptRecord>, StoreError> {
        let rows = sqlx::query_as::<_, PromptRow>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts ORDER BY server_id, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("prompts", e))?;
        rows.into_iter().map(prompt_row_to_record).collect()
    }

    pub async fn list_prompts_by_server(&self, server_id: i64) -> Result<Vec<PromptRecord>, StoreError> {
        let rows = sqlx::query_as::<_, PromptRow>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts WHERE server_id = $1 ORDER BY name"
        ))
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("prompts", e))?;
        rows.into_iter().map(prompt_row_to_record).collect()
    }

    pub async fn get_prompt(&self, server_id: i64, name: &str) -> Result<PromptRecord, StoreError> {
        let row = sqlx::query_as::<_, PromptRow>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts WHERE server_id = $1 AND name = $2"
        ))
        .bind(server_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("prompt {name}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("prompt {name}")))?;
        prompt_row_to_record(row)
    }

    pub async fn set_prompt_enabled(&self, prompt_id: i64, enabled: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE prompts SET enabled = $1 WHERE id = $2")
            .bind(i64::from(enabled))
            .bind(prompt_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("prompt", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::{SessionMode, StdioUpstreamConfig, UpstreamConfig};
    use crate::test_db;

    async fn seed_server(db: &crate::Database, name: &str) -> i64 {
        db.servers()
            .create(
                name,
                "",
                &UpstreamConfig::Stdio(StdioUpstreamConfig {
                    command: "cmd".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                }),
                SessionMode::Stateless,
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn tool_round_trip_preserves_schema_and_annotations() {
        let db = test_db().await;
        let server_id = seed_server(&db, "git").await;
        let catalog = db.catalog();

        let schema = serde_json::json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"],
        });
        let annotations = serde_json::json!({"readOnlyHint": false});

        catalog
            .insert_tool(server_id, "commit", "create a commit", &schema, Some(&annotations))
            .await
            .unwrap();

        let tool = catalog.get_tool(server_id, "commit").await.unwrap();
        assert!(tool.enabled);
        assert_eq!(tool.input_schema, schema);
        assert_eq!(tool.annotations, Some(annotations));
    }

    #[tokio::test]
    async fn same_short_name_allowed_across_servers() {
        let db = test_db().await;
        let catalog = db.catalog();
        let a = seed_server(&db, "server-a").await;
        let b = seed_server(&db, "server-b").await;

        catalog.insert_tool(a, "status", "", &serde_json::json!({}), None).await.unwrap();
        catalog.insert_tool(b, "status", "", &serde_json::json!({}), None).await.unwrap();

        // but duplicated within one server it conflicts
        let err = catalog
            .insert_tool(a, "status", "", &serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn enabled_flag_flips() {
        let db = test_db().await;
        let server_id = seed_server(&db, "time").await;
        let catalog = db.catalog();

        let tool = catalog
            .insert_tool(server_id, "convert", "", &serde_json::json!({}), None)
            .await
            .unwrap();

        catalog.set_tool_enabled(tool.id, false).await.unwrap();
        assert!(!catalog.get_tool(server_id, "convert").await.unwrap().enabled);

        catalog.set_tool_enabled(tool.id, true).await.unwrap();
        assert!(catalog.get_tool(server_id, "convert").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn prompt_arguments_round_trip() {
        let db = test_db().await;
        let server_id = seed_server(&db, "docs").await;
        let catalog = db.catalog();

        let args = vec![PromptArgument {
            name: "topic".to_string(),
            description: Some("what to summarize".to_string()),
            required: true,
        }];
        catalog.insert_prompt(server_id, "summarize", "", &args).await.unwrap();

        let prompt = catalog.get_prompt(server_id, "summarize").await.unwrap();
        assert_eq!(prompt.arguments.len(), 1);
        assert_eq!(prompt.arguments[0].name, "topic");
        assert!(prompt.arguments[0].required);
    }
}
