#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! The canopy gateway engine
//!
//! Registers upstream MCP servers, imports their tool and prompt catalogs,
//! and re-exposes the union through proxy MCP servers. Tool groups carve out
//! subset views with their own endpoints, kept in sync with the catalog
//! through change events.

pub mod catalog;
pub mod error;
pub mod events;
pub mod groups;
pub mod naming;
pub mod proxy;
pub mod session;
pub mod types;
pub mod upstream;

pub use catalog::CatalogService;
pub use error::McpError;
pub use events::{CatalogEvents, CatalogSubscriber};
pub use groups::{GroupProxyHandler, ToolGroupEngine};
pub use proxy::{AccessScope, ProxyHandler, ProxyIndex, TransportClass};
pub use session::SessionManager;
pub use types::{RegisterServerInput, ToolInvokeResult};
pub use upstream::UpstreamSession;
