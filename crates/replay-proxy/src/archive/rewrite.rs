//! Boundary to the external content-rewrite engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::body::Bytes;
use hyper::HeaderMap;

use crate::error::RewriteError;
use crate::request::InterceptedRequest;

/// An archived response as handed to the rewriter.
#[derive(Debug, Clone)]
pub struct ArchiveResponse {
    /// Archived payload.
    pub payload: Option<Bytes>,
    /// Archived headers.
    pub headers: HeaderMap,
    /// Archived status.
    pub status: u16,
    /// When the response was assembled for replay.
    pub date: DateTime<Utc>,
    /// Archive-relative URL.
    pub url: String,
}

impl ArchiveResponse {
    /// Creates a response stamped with the current time.
    pub fn new(
        payload: Option<Bytes>,
        headers: HeaderMap,
        status: u16,
        url: impl Into<String>,
    ) -> Self {
        Self {
            payload,
            headers,
            status,
            date: Utc::now(),
            url: url.into(),
        }
    }
}

/// Options passed to the rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePolicy {
    /// URL that relative links resolve against.
    pub base_url: String,
    /// Prefix prepended to rewritten URLs.
    pub prefix: String,
    /// Rewrite URLs inside the content.
    pub url_rewrite: bool,
    /// Apply content rewriting rules.
    pub content_rewrite: bool,
    /// Undo transfer and content encodings before rewriting.
    pub decode: bool,
    /// Include the rewriter's default rule set.
    pub use_base_rules: bool,
}

impl RewritePolicy {
    /// The policy used for replayed responses: content rewriting on, URL
    /// rewriting off, default rules, decoded payloads.
    pub fn for_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            prefix: String::new(),
            url_rewrite: false,
            content_rewrite: true,
            decode: true,
            use_base_rules: true,
        }
    }
}

/// Adjusts archived responses for correct replay.
#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Returns the rewritten response; headers and payload may change.
    async fn rewrite(
        &self,
        response: ArchiveResponse,
        request: &InterceptedRequest,
        policy: &RewritePolicy,
    ) -> std::result::Result<ArchiveResponse, RewriteError>;
}

/// Rewriter that returns responses unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRewriter;

#[async_trait]
impl Rewriter for PassthroughRewriter {
    async fn rewrite(
        &self,
        response: ArchiveResponse,
        _request: &InterceptedRequest,
        _policy: &RewritePolicy,
    ) -> std::result::Result<ArchiveResponse, RewriteError> {
        Ok(response)
    }
}
