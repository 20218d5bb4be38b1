//! Application state shared by both servers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use replay_proxy::{LookupRequest, MemoryBlobStore, PendingResolutions, RequestRouter};

/// How long GET /api/lookups/next waits before answering 204.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(25);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Router answering intercepted requests.
    pub router: RequestRouter,
    /// Lookups awaiting a reply; shared with the router's resolver.
    pub pending: PendingResolutions,
    /// Lookups dispatched by the resolver, drained by the control API.
    pub lookups: Arc<Mutex<mpsc::UnboundedReceiver<LookupRequest>>>,
    /// Session blobs referenced by upload bodies.
    pub blobs: MemoryBlobStore,
    /// Long-poll window.
    pub poll_timeout: Duration,
}

impl AppState {
    /// Creates state around a router and the receiving end of its lookup channel.
    pub fn new(
        router: RequestRouter,
        lookups: mpsc::UnboundedReceiver<LookupRequest>,
        blobs: MemoryBlobStore,
    ) -> Self {
        Self {
            pending: router.archive().pending().clone(),
            router,
            lookups: Arc::new(Mutex::new(lookups)),
            blobs,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Sets the long-poll window.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}
