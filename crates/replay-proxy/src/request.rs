//! Intercepted request and response types.
//!
//! These are the values that cross the interception boundary: the host hands
//! the router an [`InterceptedRequest`] and always receives exactly one
//! [`InterceptedResponse`] back.

use std::fmt;
use std::io;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, RANGE, REFERER};
use hyper::{HeaderMap, Method, StatusCode};

/// One piece of an upload body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadChunk {
    /// Literal bytes carried with the request.
    Bytes(Bytes),
    /// Reference to a blob held by the session blob store.
    Blob(String),
}

/// A single network request captured from the rendering surface.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Request method.
    pub method: Method,
    /// Target URL. The router replaces this with the archive-relative URL
    /// when it strips a replay prefix.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional upload body.
    pub upload: Option<Vec<UploadChunk>>,
    /// URL of the document that issued the request.
    pub referrer: Option<String>,
}

impl InterceptedRequest {
    /// Creates a request with no headers, body or referrer.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            upload: None,
            referrer: None,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets the referrer.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Adds a header. Values that are not valid header text are dropped.
    pub fn with_header(mut self, name: hyper::header::HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(e) => tracing::debug!("Dropping header {}: {}", name, e),
        }
        self
    }

    /// Sets the `Range` header.
    pub fn with_range(self, range: &str) -> Self {
        self.with_header(RANGE, range)
    }

    /// Sets the upload body.
    pub fn with_upload(mut self, chunks: Vec<UploadChunk>) -> Self {
        self.upload = Some(chunks);
        self
    }

    /// Returns true for HEAD requests, which never carry a response body.
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Takes the referrer from the `Referer` header when none was set.
    pub fn referrer_from_headers(mut self) -> Self {
        if self.referrer.is_none() {
            self.referrer = self
                .headers
                .get(REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }
        self
    }
}

/// Lazily produced response body.
///
/// The body is pulled chunk by chunk; dropping it part way releases whatever
/// resource feeds it (file handle, upstream connection).
pub struct ResponseBody {
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl ResponseBody {
    /// Wraps a byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A body holding a single in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_stream(stream::once(async move { Ok(bytes) }))
    }

    /// Reads the whole body into memory.
    pub async fn collect(self) -> io::Result<Bytes> {
        let chunks: Vec<Bytes> = self.inner.try_collect().await?;
        match chunks.len() {
            0 => Ok(Bytes::new()),
            1 => Ok(chunks.into_iter().next().unwrap_or_default()),
            _ => Ok(Bytes::from(chunks.concat())),
        }
    }

    /// Returns the underlying stream.
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        self.inner
    }
}

impl Stream for ResponseBody {
    type Item = io::Result<Bytes>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// The router's answer to an intercepted request.
#[derive(Debug)]
pub struct InterceptedResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body; absent for HEAD requests and bodiless replies.
    pub body: Option<ResponseBody>,
}

impl InterceptedResponse {
    /// Creates a response with the given status, no headers and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// 502 with empty headers and no body.
    pub fn bad_gateway() -> Self {
        Self::new(StatusCode::BAD_GATEWAY)
    }

    /// 504 with empty headers and no body.
    pub fn gateway_timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT)
    }

    /// Returns a header value as text.
    pub fn header(&self, name: impl hyper::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Reads the body into memory; an absent body reads as empty.
    pub async fn body_bytes(self) -> io::Result<Bytes> {
        match self.body {
            Some(body) => body.collect().await,
            None => Ok(Bytes::new()),
        }
    }
}
