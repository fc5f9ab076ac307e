//! Schema migrations, applied at connect time
//!
//! Statements are written once per dialect because auto-increment primary
//! keys have no portable spelling. Everything else sticks to types both
//! backends agree on: TEXT, BIGINT, and JSON blobs stored as TEXT.

use sqlx::AnyPool;

use crate::{Dialect, StoreError};

pub(crate) async fn run(pool: &AnyPool, dialect: Dialect) -> Result<(), StoreError> {
    let id_column = match dialect {
        Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
    };

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS mcp_servers (
                id {id_column},
                name TEXT NOT NULL UNIQUE,
                transport TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                config TEXT NOT NULL,
                session_mode TEXT NOT NULL DEFAULT 'stateless'
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS tools (
                id {id_column},
                server_id BIGINT NOT NULL REFERENCES mcp_servers(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                input_schema TEXT NOT NULL DEFAULT '{{}}',
                annotations TEXT,
                enabled BIGINT NOT NULL DEFAULT 1,
                UNIQUE(server_id, name)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS prompts (
                id {id_column},
                server_id BIGINT NOT NULL REFERENCES mcp_servers(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                arguments TEXT NOT NULL DEFAULT '[]',
                enabled BIGINT NOT NULL DEFAULT 1,
                UNIQUE(server_id, name)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS tool_groups (
                id {id_column},
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                spec TEXT NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS mcp_clients (
                id {id_column},
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                allow_list TEXT NOT NULL DEFAULT '[]',
                access_token TEXT NOT NULL UNIQUE,
                is_custom_access_token BIGINT NOT NULL DEFAULT 0
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS users (
                id {id_column},
                username TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                access_token TEXT NOT NULL UNIQUE
            )"
        ),
        // Singleton row, keyed by a fixed id
        "CREATE TABLE IF NOT EXISTS server_config (
            id BIGINT PRIMARY KEY,
            initialized BIGINT NOT NULL DEFAULT 0,
            mode TEXT
        )"
        .to_string(),
    ];

    for statement in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Internal(format!("migration failed: {e}")))?;
    }

    Ok(())
}
