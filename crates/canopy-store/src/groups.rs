//! Tool group records

use sqlx::{AnyPool, Row};

use crate::error::map_sqlx_error;
use crate::model::{GroupSpec, ToolGroupRecord};
use crate::StoreError;

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    description: String,
    spec: String,
}

fn row_to_record(row: GroupRow) -> Result<ToolGroupRecord, StoreError> {
    let spec = serde_json::from_str(&row.spec)
        .map_err(|e| StoreError::Internal(format!("corrupt spec for group {}: {e}", row.name)))?;
    Ok(ToolGroupRecord {
        id: row.id,
        name: row.name,
        description: row.description,
        spec,
    })
}

/// CRUD over tool groups
#[derive(Clone)]
pub struct GroupRepository {
    pool: AnyPool,
}

impl GroupRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        spec: &GroupSpec,
    ) -> Result<ToolGroupRecord, StoreError> {
        let spec_json = serde_json::to_string(spec)
            .map_err(|e| StoreError::Internal(format!("failed to encode group spec: {e}")))?;

        let row = sqlx::query(
            "INSERT INTO tool_groups (name, description, spec) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(&spec_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("tool group {name}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(ToolGroupRecord {
            id,
            name: name.to_string(),
            description: description.to_string(),
            spec: spec.clone(),
        })
    }

    pub async fn get_by_name(&self, name: &str) -> Result<ToolGroupRecord, StoreError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, description, spec FROM tool_groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("tool group {name}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("tool group {name}")))?;
        row_to_record(row)
    }

    pub async fn list(&self) -> Result<Vec<ToolGroupRecord>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT id, name, description, spec FROM tool_groups ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("tool groups", e))?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Replace a group's description and spec wholesale
    pub async fn update(
        &self,
        name: &str,
        description: &str,
        spec: &GroupSpec,
    ) -> Result<ToolGroupRecord, StoreError> {
        let spec_json = serde_json::to_string(spec)
            .map_err(|e| StoreError::Internal(format!("failed to encode group spec: {e}")))?;

        let result = sqlx::query("UPDATE tool_groups SET description = $1, spec = $2 WHERE name = $3")
            .bind(description)
            .bind(&spec_json)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("tool group {name}"), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tool group {name}")));
        }
        self.get_by_name(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tool_groups WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("tool group {name}"), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tool group {name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;

    #[tokio::test]
    async fn group_spec_round_trips() {
        let db = test_db().await;
        let repo = db.groups();

        let spec = GroupSpec {
            included_tools: vec!["calc__add".to_string()],
            included_servers: vec!["time".to_string()],
            excluded_tools: vec!["time__convert".to_string()],
        };
        repo.create("g1", "test group", &spec).await.unwrap();

        let fetched = repo.get_by_name("g1").await.unwrap();
        assert_eq!(fetched.spec.included_tools, vec!["calc__add"]);
        assert_eq!(fetched.spec.included_servers, vec!["time"]);
        assert_eq!(fetched.spec.excluded_tools, vec!["time__convert"]);
    }

    #[tokio::test]
    async fn update_replaces_spec() {
        let db = test_db().await;
        let repo = db.groups();

        repo.create("g1", "", &GroupSpec::default()).await.unwrap();
        let updated = repo
            .update(
                "g1",
                "updated",
                &GroupSpec {
                    included_servers: vec!["deepwiki".to_string()],
                    ..GroupSpec::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "updated");
        assert_eq!(updated.spec.included_servers, vec!["deepwiki"]);
    }

    #[tokio::test]
    async fn delete_and_missing_lookups() {
        let db = test_db().await;
        let repo = db.groups();

        repo.create("doomed", "", &GroupSpec::default()).await.unwrap();
        repo.delete("doomed").await.unwrap();
        assert!(repo.get_by_name("doomed").await.unwrap_err().is_not_found());
        assert!(repo.delete("doomed").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn duplicate_group_name_conflicts() {
        let db = test_db().await;
        let repo = db.groups();

        repo.create("g1", "", &GroupSpec::default()).await.unwrap();
        let err = repo.create("g1", "", &GroupSpec::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
