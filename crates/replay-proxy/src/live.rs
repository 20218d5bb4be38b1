//! Live network passthrough.
//!
//! Requests that belong neither to the local origin nor to an archived page
//! are forwarded to the real network and the upstream response is streamed
//! back unmodified.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, USER_AGENT};
use parking_lot::RwLock;

use crate::error::{ProxyError, Result};
use crate::request::{InterceptedRequest, InterceptedResponse, ResponseBody, UploadChunk};

/// Resolves blob references found in upload bodies.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the content of the blob with the given identifier.
    async fn blob_data(&self, id: &str) -> Result<Bytes>;
}

/// Session-scoped in-memory blob store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a blob, replacing any previous content.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.write().insert(id.into(), data.into());
    }

    /// Removes a blob. Returns true if it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.blobs.write().remove(id).is_some()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true when no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn blob_data(&self, id: &str) -> Result<Bytes> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ProxyError::BlobNotFound(id.to_string()))
    }
}

/// Forwards requests to the real network.
#[derive(Clone)]
pub struct LiveProxy {
    client: reqwest::Client,
    user_agent: Option<HeaderValue>,
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for LiveProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveProxy")
            .field("user_agent", &self.user_agent)
            .field("blobs", &"BlobStore")
            .finish()
    }
}

impl LiveProxy {
    /// Creates a live proxy resolving blob references through `blobs`.
    ///
    /// Redirects are not followed and content is not decoded so that the
    /// upstream response reaches the rendering surface as sent.
    pub fn new(blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self::with_client(client, blobs))
    }

    /// Creates a live proxy with a preconfigured client.
    pub fn with_client(client: reqwest::Client, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            client,
            user_agent: None,
            blobs,
        }
    }

    /// Records the rendering engine's default user agent. Live requests are
    /// sent with it instead of whatever the page set.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        match HeaderValue::from_str(user_agent) {
            Ok(value) => self.user_agent = Some(value),
            Err(e) => tracing::warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
        }
        self
    }

    /// The recorded user agent, if any.
    pub fn user_agent(&self) -> Option<&HeaderValue> {
        self.user_agent.as_ref()
    }

    /// Forwards the request. Network failures produce a bare 502.
    pub async fn proxy(&self, request: InterceptedRequest) -> InterceptedResponse {
        let InterceptedRequest {
            method,
            url,
            mut headers,
            upload,
            ..
        } = request;

        if let Some(ua) = &self.user_agent {
            headers.insert(USER_AGENT, ua.clone());
        }

        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .headers(headers);

        if let Some(chunks) = upload {
            builder = builder.body(reqwest::Body::wrap_stream(upload_stream(
                chunks,
                self.blobs.clone(),
            )));
        }

        let upstream = match builder.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!("fetch failed for: {} ({})", url, e);
                return InterceptedResponse::bad_gateway();
            }
        };

        let status = upstream.status();
        let headers = upstream.headers().clone();

        let body = if method == hyper::Method::HEAD {
            None
        } else {
            Some(ResponseBody::from_stream(
                upstream.bytes_stream().map_err(io::Error::other),
            ))
        };

        InterceptedResponse {
            status,
            headers,
            body,
        }
    }
}

/// Turns upload chunks into a byte stream, resolving blob references one at
/// a time as the stream is polled.
fn upload_stream(
    chunks: Vec<UploadChunk>,
    blobs: Arc<dyn BlobStore>,
) -> impl futures::Stream<Item = Result<Bytes>> + Send + 'static {
    stream::iter(chunks).then(move |chunk| {
        let blobs = blobs.clone();
        async move {
            match chunk {
                UploadChunk::Bytes(bytes) => Ok(bytes),
                UploadChunk::Blob(id) => blobs.blob_data(&id).await,
            }
        }
    })
}
