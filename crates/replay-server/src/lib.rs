//! Replay Server - interception front and archive control API.
//!
//! Two HTTP servers share one [`AppState`]:
//!
//! - The **interception front** listens on the local origin port and answers
//!   every request (any method, any path) through the request router.
//! - The **control API** lets the archive service pick up lookups and post
//!   replies.
//!
//! ## Control endpoints
//!
//! - `GET /api/lookups/next` - Long-poll for the next lookup (204 on timeout)
//! - `POST /api/lookups/{token}` - Deliver a reply for a lookup
//! - `GET /api/lookups/pending` - Count lookups awaiting a reply
//! - `PUT /api/blobs/{id}` - Store a session blob
//! - `DELETE /api/blobs/{id}` - Drop a session blob
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use replay_proxy::{
//!     ArchiveContext, ArchiveResolver, LiveProxy, MemoryBlobStore, PassthroughRewriter,
//!     PendingResolutions, RequestRouter, RouterConfig,
//! };
//! use replay_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//!     let blobs = MemoryBlobStore::new();
//!     let archive = ArchiveResolver::new(
//!         ArchiveContext::new(),
//!         PendingResolutions::new(),
//!         Arc::new(tx),
//!         Arc::new(PassthroughRewriter),
//!     );
//!     let live = LiveProxy::new(Arc::new(blobs.clone())).unwrap();
//!     let router = RequestRouter::new(RouterConfig::new("./ui"), archive, live);
//!
//!     let state = AppState::new(router, rx, blobs);
//!     let server = Server::new(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

pub use error::{ApiError, Result};
pub use state::{AppState, DEFAULT_POLL_TIMEOUT};

/// Default control API port.
pub const DEFAULT_CONTROL_PORT: u16 = 5472;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind both servers to (default: 127.0.0.1).
    pub host: String,
    /// Interception front port (default: 5471).
    pub port: u16,
    /// Control API port (default: 5472).
    pub control_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: replay_proxy::DEFAULT_ORIGIN_PORT,
            control_port: DEFAULT_CONTROL_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the interception front port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the control API port.
    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Router for the interception front.
pub fn front_router(state: AppState) -> Router {
    Router::new()
        .fallback(handlers::intercept)
        .with_state(state)
}

/// Router for the control API.
///
/// Cross-origin access is limited to the local origin: lookups carry the
/// intercepted request headers, cookies included.
pub fn control_router(state: AppState) -> Router {
    let origin = state.router.config().static_prefix.trim_end_matches('/');
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            warn!("Local origin {} is not a valid header: {}", origin, e);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/lookups/next", get(handlers::next_lookup))
        .route("/api/lookups/pending", get(handlers::pending_lookups))
        .route("/api/lookups/{token}", post(handlers::deliver_reply))
        .route(
            "/api/blobs/{id}",
            put(handlers::put_blob).delete(handlers::delete_blob),
        )
        .layer(cors)
        .with_state(state)
}

/// The interception front and control API servers.
pub struct Server {
    front: Router,
    control: Router,
    front_addr: SocketAddr,
    control_addr: SocketAddr,
}

impl Server {
    /// Creates both servers over shared state.
    pub fn new(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let front_addr = parse_addr(&config.host, config.port)?;
        let control_addr = parse_addr(&config.host, config.control_port)?;

        Ok(Self {
            front: front_router(state.clone()),
            control: control_router(state),
            front_addr,
            control_addr,
        })
    }

    /// Returns the interception front address.
    pub fn addr(&self) -> SocketAddr {
        self.front_addr
    }

    /// Returns the control API address.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Runs both servers until either stops.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting interception front on {}", self.front_addr);
        let front = bind(self.front_addr)?;
        info!("Starting control API on {}", self.control_addr);
        let control = bind(self.control_addr)?;

        tokio::try_join!(
            async {
                axum::serve(front, self.front)
                    .await
                    .map_err(|e| ServerError::Runtime(e.to_string()))
            },
            async {
                axum::serve(control, self.control)
                    .await
                    .map_err(|e| ServerError::Runtime(e.to_string()))
            },
        )?;

        Ok(())
    }

    /// Returns the interception front router for testing.
    pub fn router(&self) -> Router {
        self.front.clone()
    }

    /// Returns the control API router for testing.
    pub fn control_router(&self) -> Router {
        self.control.clone()
    }
}

fn parse_addr(host: &str, port: u16) -> std::result::Result<SocketAddr, ServerError> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))
}

/// Binds a listener with SO_REUSEADDR so restarts survive lingering sockets.
fn bind(addr: SocketAddr) -> std::result::Result<tokio::net::TcpListener, ServerError> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::BindError(addr, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .listen(128)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::BindError(addr, e))?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).map_err(|e| ServerError::BindError(addr, e))
}
