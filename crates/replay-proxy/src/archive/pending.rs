//! Correlation of archive lookups with their replies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use hyper::body::Bytes;
use hyper::HeaderMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ProxyError, Result};
use crate::request::InterceptedRequest;

/// Outbound message asking the archive service to resolve a request.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    /// Correlation token the reply must carry.
    pub token: String,
    /// Current collection, if one was observed.
    pub collection: Option<String>,
    /// Current capture timestamp, if one was observed.
    pub timestamp: Option<String>,
    /// The request with its archive-relative URL.
    pub request: InterceptedRequest,
}

/// The archive service's answer to a [`LookupRequest`].
#[derive(Debug, Clone, Default)]
pub struct LookupReply {
    /// Status of the archived response.
    pub status: u16,
    /// Archived response headers.
    pub headers: HeaderMap,
    /// Archived payload; absent for a miss.
    pub payload: Option<Bytes>,
}

impl LookupReply {
    /// Creates a reply.
    pub fn new(status: u16, headers: HeaderMap, payload: Option<Bytes>) -> Self {
        Self {
            status,
            headers,
            payload,
        }
    }

    /// The archive has nothing for the URL.
    pub fn miss() -> Self {
        Self::new(404, HeaderMap::new(), None)
    }
}

/// Hands lookups to the external archive service without waiting.
pub trait LookupChannel: Send + Sync {
    /// Sends the lookup. An error means nobody will ever answer it.
    fn dispatch(&self, lookup: LookupRequest) -> Result<()>;
}

impl LookupChannel for mpsc::UnboundedSender<LookupRequest> {
    fn dispatch(&self, lookup: LookupRequest) -> Result<()> {
        self.send(lookup)
            .map_err(|e| ProxyError::Dispatch(e.to_string()))
    }
}

/// In-flight lookups keyed by correlation token.
///
/// A token is registered before its lookup is dispatched and removed by the
/// first reply, so at most one reply is ever delivered per token.
#[derive(Debug, Clone, Default)]
pub struct PendingResolutions {
    inner: Arc<PendingInner>,
}

#[derive(Debug, Default)]
struct PendingInner {
    waiting: Mutex<HashMap<String, oneshot::Sender<LookupReply>>>,
    next_seq: AtomicU64,
}

impl PendingResolutions {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new lookup for `url` and returns its token and the
    /// receiver its reply will arrive on.
    pub fn register(&self, url: &str) -> (String, oneshot::Receiver<LookupReply>) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = format!("req:{}:{}:{}", Utc::now().timestamp_millis(), seq, url);

        let (tx, rx) = oneshot::channel();
        self.inner.waiting.lock().insert(token.clone(), tx);
        (token, rx)
    }

    /// Delivers a reply. Returns false if the token is unknown, was already
    /// answered, or its resolver has gone away.
    pub fn fulfill(&self, token: &str, reply: LookupReply) -> bool {
        let sender = self.inner.waiting.lock().remove(token);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                tracing::debug!("No pending lookup for token {}", token);
                false
            }
        }
    }

    /// Forgets a token without answering it.
    pub fn cancel(&self, token: &str) -> bool {
        self.inner.waiting.lock().remove(token).is_some()
    }

    /// Returns true while the token awaits its reply.
    pub fn is_pending(&self, token: &str) -> bool {
        self.inner.waiting.lock().contains_key(token)
    }

    /// Number of lookups awaiting a reply.
    pub fn len(&self) -> usize {
        self.inner.waiting.lock().len()
    }

    /// Returns true when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its token from the registry when dropped.
pub(crate) struct Registration {
    pending: PendingResolutions,
    token: String,
}

impl Registration {
    pub(crate) fn new(pending: PendingResolutions, token: String) -> Self {
        Self { pending, token }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.pending.cancel(&self.token) {
            tracing::debug!("Released unanswered lookup {}", self.token);
        }
    }
}
