//! Human user records

use sqlx::{AnyPool, Row};

use crate::error::map_sqlx_error;
use crate::model::{UserRecord, UserRole};
use crate::StoreError;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    role: String,
    access_token: String,
}

fn row_to_record(row: UserRow) -> Result<UserRecord, StoreError> {
    Ok(UserRecord {
        id: row.id,
        username: row.username,
        role: UserRole::parse(&row.role)?,
        access_token: row.access_token,
    })
}

/// CRUD over users
#[derive(Clone)]
pub struct UserRepository {
    pool: AnyPool,
}

impl UserRepository {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        role: UserRole,
        access_token: &str,
    ) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users (username, role, access_token) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(username)
        .bind(role.as_str())
        .bind(access_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("user {username}"), e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Internal(format!("failed to read inserted id: {e}")))?;

        Ok(UserRecord {
            id,
            username: username.to_string(),
            role,
            access_token: access_token.to_string(),
        })
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, role, access_token FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("users", e))?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserRecord, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, role, access_token FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("user {username}"), e))?
        .ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
        row_to_record(row)
    }

    pub async fn get_by_token(&self, token: &str) -> Result<UserRecord, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, role, access_token FROM users WHERE access_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("user", e))?
        .ok_or_else(|| StoreError::NotFound("user".to_string()))?;
        row_to_record(row)
    }

    /// Rotate a user's access token
    pub async fn update_token(&self, username: &str, access_token: &str) -> Result<UserRecord, StoreError> {
        let result = sqlx::query("UPDATE users SET access_token = $1 WHERE username = $2")
            .bind(access_token)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("user {username}"), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        self.get_by_username(username).await
    }

    pub async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("user {username}"), e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db;

    #[tokio::test]
    async fn create_and_authenticate() {
        let db = test_db().await;
        let repo = db.users();

        repo.create("admin", UserRole::Admin, "admin-token-1").await.unwrap();
        repo.create("alice", UserRole::User, "alice-token-1").await.unwrap();

        let admin = repo.get_by_token("admin-token-1").await.unwrap();
        assert_eq!(admin.role, UserRole::Admin);

        let alice = repo.get_by_username("alice").await.unwrap();
        assert_eq!(alice.role, UserRole::User);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let db = test_db().await;
        let repo = db.users();

        repo.create("bob", UserRole::User, "bob-token-1").await.unwrap();
        let err = repo.create("bob", UserRole::User, "bob-token-2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn token_rotation_invalidates_old_token() {
        let db = test_db().await;
        let repo = db.users();

        repo.create("carol", UserRole::User, "old-token-1").await.unwrap();
        repo.update_token("carol", "new-token-1").await.unwrap();

        assert!(repo.get_by_token("old-token-1").await.unwrap_err().is_not_found());
        assert_eq!(repo.get_by_token("new-token-1").await.unwrap().username, "carol");
    }
}
