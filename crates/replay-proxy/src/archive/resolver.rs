//! Resolution of replay requests against the external archive service.

use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE};
use hyper::StatusCode;
use tokio::sync::oneshot;

use super::context::ArchiveContext;
use super::pending::{LookupChannel, LookupReply, LookupRequest, PendingResolutions, Registration};
use super::rewrite::{ArchiveResponse, RewritePolicy, Rewriter};
use crate::not_found::not_found;
use crate::range::parse_range;
use crate::request::{InterceptedRequest, InterceptedResponse, ResponseBody};

/// Resolver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound on the wait for a lookup reply. `None` waits until the
    /// archive service answers, however long that takes.
    pub lookup_timeout: Option<Duration>,
}

impl ResolverConfig {
    /// Sets the lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }
}

/// Answers replay requests from the archive.
#[derive(Clone)]
pub struct ArchiveResolver {
    context: ArchiveContext,
    pending: PendingResolutions,
    channel: Arc<dyn LookupChannel>,
    rewriter: Arc<dyn Rewriter>,
    config: ResolverConfig,
}

impl std::fmt::Debug for ArchiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveResolver")
            .field("context", &self.context)
            .field("pending", &self.pending.len())
            .field("channel", &"LookupChannel")
            .field("rewriter", &"Rewriter")
            .field("config", &self.config)
            .finish()
    }
}

impl ArchiveResolver {
    /// Creates a resolver dispatching lookups through `channel` and
    /// rewriting replies with `rewriter`.
    pub fn new(
        context: ArchiveContext,
        pending: PendingResolutions,
        channel: Arc<dyn LookupChannel>,
        rewriter: Arc<dyn Rewriter>,
    ) -> Self {
        Self {
            context,
            pending,
            channel,
            rewriter,
            config: ResolverConfig::default(),
        }
    }

    /// Sets the resolver configuration.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry replies are delivered to.
    pub fn pending(&self) -> &PendingResolutions {
        &self.pending
    }

    /// The shared archive context.
    pub fn context(&self) -> &ArchiveContext {
        &self.context
    }

    /// Resolves `request`, whose URL is the archive-relative target.
    ///
    /// The lookup carries whatever coordinates are current at dispatch. If
    /// the returned future is dropped before the reply arrives, the token is
    /// released and a late reply is rejected.
    pub async fn resolve(&self, request: InterceptedRequest) -> InterceptedResponse {
        let coordinates = self.context.current();
        let (token, reply_rx) = self.pending.register(&request.url);
        let _registration = Registration::new(self.pending.clone(), token.clone());

        let lookup = LookupRequest {
            token,
            collection: coordinates.as_ref().map(|c| c.collection.clone()),
            timestamp: coordinates.map(|c| c.timestamp),
            request: request.clone(),
        };

        if let Err(e) = self.channel.dispatch(lookup) {
            tracing::warn!("Could not dispatch lookup for {}: {}", request.url, e);
            return InterceptedResponse::bad_gateway();
        }

        match self.await_reply(&request.url, reply_rx).await {
            Ok(reply) => self.respond(request, reply).await,
            Err(response) => response,
        }
    }

    async fn await_reply(
        &self,
        url: &str,
        reply_rx: oneshot::Receiver<LookupReply>,
    ) -> std::result::Result<LookupReply, InterceptedResponse> {
        let outcome = match self.config.lookup_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Lookup for {} timed out after {:?}", url, limit);
                    return Err(InterceptedResponse::gateway_timeout());
                }
            },
            None => reply_rx.await,
        };

        outcome.map_err(|_| {
            tracing::warn!("Lookup for {} was abandoned", url);
            InterceptedResponse::bad_gateway()
        })
    }

    async fn respond(&self, request: InterceptedRequest, reply: LookupReply) -> InterceptedResponse {
        let url = request.url.clone();

        if reply.status == 404 && reply.payload.is_none() {
            return not_found(&url);
        }
        tracing::info!("got response for: {}", url);

        let Ok(status) = StatusCode::from_u16(reply.status) else {
            tracing::warn!("Archive returned invalid status {} for {}", reply.status, url);
            return InterceptedResponse::bad_gateway();
        };

        let archived = ArchiveResponse::new(reply.payload, reply.headers, reply.status, url.clone());
        let policy = RewritePolicy::for_url(url.clone());

        let rewritten = match self.rewriter.rewrite(archived, &request, &policy).await {
            Ok(rewritten) => rewritten,
            Err(e) => {
                tracing::warn!("Rewrite failed for {}: {}", url, e);
                return InterceptedResponse::bad_gateway();
            }
        };

        let mut headers = rewritten.headers;
        let mut data = rewritten.payload.unwrap_or_default();
        let mut status = status;

        // Archived framing headers describe the pre-rewrite payload.
        headers.remove(CONTENT_RANGE);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len() as u64));

        if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
            let range = parse_range(&request.headers, Some(&mut headers), data.len() as u64);
            if range.range.is_some() {
                data = data.slice_ref(range.slice(&data));
            }
            status = range.status;
        }

        let body = if request.is_head() {
            None
        } else {
            Some(ResponseBody::from_bytes(data))
        };

        InterceptedResponse {
            status,
            headers,
            body,
        }
    }
}
