//! Server lifecycle
//!
//! The gateway starts uninitialized and transitions exactly once into a
//! mode. Development mode initializes silently at startup. Enterprise mode
//! is initialized through `POST /init`, which creates the single admin
//! user and returns its access token exactly once. The persisted mode is
//! immutable: a process configured for a different mode fails fast.

use std::sync::{Arc, RwLock};

use canopy_config::ServerMode;
use canopy_core::token::generate_access_token;
use canopy_mcp::McpError;
use canopy_store::{Database, ServerConfigRecord, UserRecord, UserRole};

pub struct Lifecycle {
    db: Database,
    state: RwLock<ServerConfigRecord>,
}

impl Lifecycle {
    pub async fn load(db: Database) -> Result<Arc<Self>, McpError> {
        let state = db.server_config().get().await?;
        Ok(Arc::new(Self {
            db,
            state: RwLock::new(state),
        }))
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().expect("lifecycle state poisoned").initialized
    }

    pub fn mode(&self) -> Option<ServerMode> {
        self.state.read().expect("lifecycle state poisoned").mode
    }

    /// Enforce startup semantics for the configured mode
    ///
    /// Development mode initializes on the spot. Enterprise mode stays
    /// uninitialized until `/init` is called. A database initialized in a
    /// different mode than the configured one is a fatal mismatch.
    pub async fn startup(&self, configured: ServerMode) -> Result<(), McpError> {
        let current = self.state.read().expect("lifecycle state poisoned").clone();

        if current.initialized {
            return match current.mode {
                Some(mode) if mode == configured => Ok(()),
                mode => Err(McpError::Conflict(format!(
                    "server was initialized in {} mode but SERVER_MODE is {}",
                    mode.map_or("unknown", ServerMode::as_str),
                    configured.as_str()
                ))),
            };
        }

        if configured == ServerMode::Development {
            self.init(ServerMode::Development).await?;
        }
        Ok(())
    }

    /// Transition uninitialized → initialized(mode)
    ///
    /// In enterprise mode this also creates the admin user; the returned
    /// record carries the only copy of its access token the gateway will
    /// ever hand out.
    pub async fn init(&self, mode: ServerMode) -> Result<Option<UserRecord>, McpError> {
        let transitioned = self.db.server_config().init(mode).await?;
        if !transitioned {
            return Err(McpError::Conflict("server is already initialized".to_string()));
        }

        let admin = match mode {
            ServerMode::Enterprise => {
                let token = generate_access_token();
                Some(self.db.users().create("admin", UserRole::Admin, &token).await?)
            }
            ServerMode::Development => None,
        };

        *self.state.write().expect("lifecycle state poisoned") = ServerConfigRecord {
            initialized: true,
            mode: Some(mode),
        };

        tracing::info!(mode = mode.as_str(), "server initialized");
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lifecycle() -> Arc<Lifecycle> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Lifecycle::load(db).await.unwrap()
    }

    #[tokio::test]
    async fn dev_startup_initializes_silently() {
        let lifecycle = lifecycle().await;
        assert!(!lifecycle.is_initialized());

        lifecycle.startup(ServerMode::Development).await.unwrap();
        assert!(lifecycle.is_initialized());
        assert_eq!(lifecycle.mode(), Some(ServerMode::Development));
    }

    #[tokio::test]
    async fn enterprise_startup_waits_for_init() {
        let lifecycle = lifecycle().await;
        lifecycle.startup(ServerMode::Enterprise).await.unwrap();
        assert!(!lifecycle.is_initialized());

        let admin = lifecycle.init(ServerMode::Enterprise).await.unwrap().unwrap();
        assert_eq!(admin.username, "admin");
        assert_eq!(admin.role, UserRole::Admin);
        assert!(!admin.access_token.is_empty());
        assert!(lifecycle.is_initialized());
    }

    #[tokio::test]
    async fn init_happens_exactly_once() {
        let lifecycle = lifecycle().await;
        lifecycle.init(ServerMode::Enterprise).await.unwrap();

        let err = lifecycle.init(ServerMode::Enterprise).await.unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }

    #[tokio::test]
    async fn startup_fails_fast_on_mode_mismatch() {
        let lifecycle = lifecycle().await;
        lifecycle.startup(ServerMode::Development).await.unwrap();

        let err = lifecycle.startup(ServerMode::Enterprise).await.unwrap_err();
        assert!(matches!(err, McpError::Conflict(_)));
    }

    #[tokio::test]
    async fn dev_init_creates_no_admin() {
        let lifecycle = lifecycle().await;
        let admin = lifecycle.init(ServerMode::Development).await.unwrap();
        assert!(admin.is_none());
    }
}
