#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! HTTP surface of the canopy gateway
//!
//! Assembles the MCP proxy endpoints, the per-group endpoints, and the
//! admin API into one axum router, with authentication middleware in
//! front and lifecycle gating around everything but the bootstrap routes.

pub mod auth;
mod endpoints;
mod error;
mod handlers;
mod lifecycle;

pub use endpoints::GroupEndpointCache;
pub use error::ApiError;
pub use lifecycle::Lifecycle;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;
use canopy_config::{Config, ServerMode};
use canopy_mcp::{CatalogEvents, CatalogService, SessionManager, ToolGroupEngine};
use canopy_store::Database;
use canopy_telemetry::ToolCallMetrics;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub catalog: Arc<CatalogService>,
    pub engine: Arc<ToolGroupEngine>,
    pub lifecycle: Arc<Lifecycle>,
    pub group_endpoints: Arc<GroupEndpointCache>,
    pub metrics_registry: Option<prometheus::Registry>,
    pub configured_mode: ServerMode,
}

/// Assembled gateway server
pub struct Server {
    router: Router,
    port: u16,
    sessions: Arc<SessionManager>,
    db: Database,
    sse_ct: CancellationToken,
    group_endpoints: Arc<GroupEndpointCache>,
}

impl Server {
    /// Build the server: open the store, load the catalog and groups, and
    /// assemble the router
    pub async fn new(config: Config, metrics_registry: Option<prometheus::Registry>) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url).await?;

        let lifecycle = Lifecycle::load(db.clone()).await?;
        lifecycle.startup(config.mode).await?;

        let events = Arc::new(CatalogEvents::new());
        let sessions = SessionManager::new(config.mcp_server_init_req_timeout, config.session_idle_timeout);
        let catalog = CatalogService::new(
            db.clone(),
            Arc::clone(&sessions),
            Arc::clone(&events),
            ToolCallMetrics::new(),
            config.mcp_server_init_req_timeout,
        )
        .await?;

        let engine = ToolGroupEngine::load(db.clone(), catalog.index()).await?;
        events.subscribe(engine.clone());

        let group_endpoints = Arc::new(GroupEndpointCache::new(Arc::clone(&catalog), Arc::clone(&engine)));

        let state = AppState {
            db: db.clone(),
            catalog,
            engine,
            lifecycle,
            group_endpoints: Arc::clone(&group_endpoints),
            metrics_registry,
            configured_mode: config.mode,
        };

        let (router, sse_ct) = build_router(state);

        Ok(Self {
            router,
            port: config.port,
            sessions,
            db,
            sse_ct,
            group_endpoints,
        })
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered, then drains
    /// in-flight requests, closes upstream sessions, and releases the
    /// database handle.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.sessions.spawn_idle_reaper(shutdown.clone());

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.port))).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "canopy listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown({
                let shutdown = shutdown.clone();
                async move {
                    shutdown.cancelled().await;
                    tracing::info!("graceful shutdown initiated");
                }
            })
            .await?;

        self.sse_ct.cancel();
        self.group_endpoints.shutdown();
        self.sessions.close_all().await;
        self.db.close().await;

        Ok(())
    }
}

fn build_router(state: AppState) -> (Router, CancellationToken) {
    use axum::middleware::from_fn_with_state;
    use handlers::{clients, groups, prompts, servers, system, tools, users};

    // MCP proxy endpoints: the two global proxy servers plus per-group
    // dispatch, all behind proxy auth and the initialization gate.
    let (global_proxy, sse_ct) = endpoints::global_proxy_routes(&state.catalog);
    let proxy = global_proxy
        .route(
            "/v0/groups/{name}/mcp",
            any(endpoints::group_endpoint).with_state(state.clone()),
        )
        .route(
            "/v0/groups/{name}/sse",
            any(endpoints::group_endpoint).with_state(state.clone()),
        )
        .route(
            "/v0/groups/{name}/message",
            any(endpoints::group_endpoint).with_state(state.clone()),
        )
        .layer(from_fn_with_state(state.clone(), auth::proxy_auth))
        .layer(from_fn_with_state(state.clone(), auth::require_initialized));

    // Admin/user API. Authentication is middleware; authorization is done
    // by extractors in the handlers.
    let api = Router::new()
        .route("/servers", get(servers::list).post(servers::register))
        .route("/servers/{name}", axum::routing::delete(servers::deregister))
        .route("/servers/{name}/enable", post(servers::enable))
        .route("/servers/{name}/disable", post(servers::disable))
        .route("/server_configs", get(servers::server_configs))
        .route("/tools", get(tools::list))
        .route("/tool", get(tools::get))
        .route("/tools/invoke", post(tools::invoke))
        .route("/tools/enable", post(tools::enable))
        .route("/tools/disable", post(tools::disable))
        .route("/prompts", get(prompts::list))
        .route("/prompt", get(prompts::get))
        .route("/prompts/render", post(prompts::render))
        .route("/prompts/enable", post(prompts::enable))
        .route("/prompts/disable", post(prompts::disable))
        .route("/tool-groups", get(groups::list).post(groups::create))
        .route(
            "/tool-groups/{name}",
            get(groups::get).put(groups::update).delete(groups::delete),
        )
        .route("/clients", get(clients::list).post(clients::create))
        .route(
            "/clients/{name}",
            axum::routing::put(clients::update).delete(clients::delete),
        )
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/{username}",
            axum::routing::put(users::update).delete(users::delete),
        )
        .route("/users/whoami", get(users::whoami))
        .layer(from_fn_with_state(state.clone(), auth::api_auth))
        .layer(from_fn_with_state(state.clone(), auth::require_initialized))
        .with_state(state.clone());

    let mut app = Router::new()
        .route("/health", get(system::health))
        .route("/metadata", get(system::metadata))
        .route("/init", post(system::init).with_state(state.clone()))
        .merge(proxy)
        .nest("/api/v0", api);

    if state.metrics_registry.is_some() {
        app = app.route("/metrics", get(system::metrics).with_state(state.clone()));
    }

    (app.layer(TraceLayer::new_for_http()), sse_ct)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use http::{header, Request, StatusCode};
    use tower::ServiceExt as _;

    use super::*;

    fn test_config(mode: ServerMode) -> Config {
        Config {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            mode,
            otel_enabled: false,
            mcp_server_init_req_timeout: Duration::from_secs(1),
            session_idle_timeout: None,
        }
    }

    async fn router(mode: ServerMode) -> Router {
        Server::new(test_config(mode), None).await.unwrap().into_router()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_and_metadata_are_open() {
        let app = router(ServerMode::Development).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metadata").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn dev_mode_api_is_open() {
        let app = router(ServerMode::Development).await;

        let response = app
            .oneshot(Request::builder().uri("/api/v0/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn uninitialized_enterprise_gates_the_api() {
        let app = router(ServerMode::Enterprise).await;

        let response = app
            .oneshot(Request::builder().uri("/api/v0/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enterprise_init_returns_admin_token_that_authenticates() {
        let app = router(ServerMode::Enterprise).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/init")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"mode": "enterprise"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let token = body["admin_access_token"].as_str().unwrap().to_string();
        assert!(!token.is_empty());

        // a second init is rejected
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/init")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"mode": "enterprise"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // the admin token authenticates against the API
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v0/servers")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // a bogus token does not
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v0/servers")
                    .header(header::AUTHORIZATION, "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enterprise_only_endpoints_reject_dev_mode() {
        let app = router(ServerMode::Development).await;

        let response = app
            .oneshot(Request::builder().uri("/api/v0/clients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_group_endpoint_is_not_found() {
        let app = router(ServerMode::Development).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v0/groups/missing/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_route_only_exists_when_enabled() {
        let app = router(ServerMode::Development).await;
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_api_requires_admin_role() {
        let app = router(ServerMode::Enterprise).await;

        // initialize and create a standard user
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/init")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let admin_token = body_json(response).await["admin_access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v0/users")
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username": "alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let user_token = body_json(response).await["access_token"].as_str().unwrap().to_string();

        // standard users can read the catalog
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v0/tools")
                    .header(header::AUTHORIZATION, format!("Bearer {user_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // but cannot perform admin operations
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v0/users")
                    .header(header::AUTHORIZATION, format!("Bearer {user_token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username": "bob"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
