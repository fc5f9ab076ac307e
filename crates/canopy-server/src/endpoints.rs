//! MCP endpoint wiring
//!
//! The global catalog is served by two proxy MCP servers: streamable HTTP
//! on `/mcp` and SSE on `/sse` + `/message`. Each tool group additionally
//! gets its own pair under `/v0/groups/{name}/`. Group endpoints are built
//! lazily and cached by group name so SSE sessions stay coherent across
//! requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use canopy_mcp::{CatalogService, GroupProxyHandler, McpError, ProxyHandler, ToolGroupEngine, TransportClass};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{StreamableHttpServerConfig, StreamableHttpService};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;

use crate::error::ApiError;
use crate::AppState;

// SseServerConfig wants a bind address; ours serve through the outer
// router, so the address is never bound.
fn unused_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn streamable_service<H>(handler: H) -> StreamableHttpService<H, LocalSessionManager>
where
    H: rmcp::ServerHandler + Clone,
{
    StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            stateful_mode: false,
            ..Default::default()
        },
    )
}

/// Build the routes for the two global proxy MCP servers
///
/// Returns the router plus the cancellation token driving the SSE service
/// loop; the caller cancels it on shutdown.
pub fn global_proxy_routes(catalog: &Arc<CatalogService>) -> (Router, CancellationToken) {
    let streamable = streamable_service(ProxyHandler::new(Arc::clone(catalog), TransportClass::Streamable));

    let ct = CancellationToken::new();
    let (sse_server, sse_router) = SseServer::new(SseServerConfig {
        bind: unused_bind_addr(),
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: ct.clone(),
        sse_keep_alive: None,
    });
    let sse_handler = ProxyHandler::new(Arc::clone(catalog), TransportClass::Sse);
    sse_server.with_service(move || sse_handler.clone());

    let router = Router::new().route_service("/mcp", streamable).merge(sse_router);

    (router, ct)
}

struct CachedGroup {
    router: Router,
    ct: CancellationToken,
}

/// Per-group MCP endpoint cache
///
/// One router per group, holding its streamable-HTTP service and its SSE
/// server instance. Entries are dropped (and their SSE loops cancelled)
/// when the group is deleted.
pub struct GroupEndpointCache {
    catalog: Arc<CatalogService>,
    engine: Arc<ToolGroupEngine>,
    routers: RwLock<HashMap<String, CachedGroup>>,
}

impl GroupEndpointCache {
    pub fn new(catalog: Arc<CatalogService>, engine: Arc<ToolGroupEngine>) -> Self {
        Self {
            catalog,
            engine,
            routers: RwLock::new(HashMap::new()),
        }
    }

    fn router_for(&self, group_name: &str) -> Router {
        if let Some(cached) = self.routers.read().expect("group endpoint cache poisoned").get(group_name) {
            return cached.router.clone();
        }

        let mut routers = self.routers.write().expect("group endpoint cache poisoned");
        // Another request may have built it while we waited for the lock
        if let Some(cached) = routers.get(group_name) {
            return cached.router.clone();
        }

        let handler = GroupProxyHandler::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.engine),
            group_name.to_string(),
        );

        let ct = CancellationToken::new();
        let (sse_server, sse_router) = SseServer::new(SseServerConfig {
            bind: unused_bind_addr(),
            sse_path: format!("/v0/groups/{group_name}/sse"),
            post_path: format!("/v0/groups/{group_name}/message"),
            ct: ct.clone(),
            sse_keep_alive: None,
        });
        let sse_handler = handler.clone();
        sse_server.with_service(move || sse_handler.clone());

        let router = Router::new()
            .route_service(&format!("/v0/groups/{group_name}/mcp"), streamable_service(handler))
            .merge(sse_router);

        routers.insert(group_name.to_string(), CachedGroup { router: router.clone(), ct });
        router
    }

    /// Drop a group's endpoints and stop its SSE service loop
    pub fn remove(&self, group_name: &str) {
        if let Some(cached) = self
            .routers
            .write()
            .expect("group endpoint cache poisoned")
            .remove(group_name)
        {
            cached.ct.cancel();
        }
    }

    /// Cancel every group SSE loop; used at shutdown
    pub fn shutdown(&self) {
        for cached in self.routers.read().expect("group endpoint cache poisoned").values() {
            cached.ct.cancel();
        }
    }
}

/// Dispatch a request to the addressed group's MCP endpoints
pub async fn group_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    if !state.group_endpoints.engine.group_exists(&name) {
        return ApiError(McpError::NotFound(format!("tool group {name}"))).into_response();
    }

    let router = state.group_endpoints.router_for(&name);
    match router.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(infallible) => match infallible {},
    }
}
