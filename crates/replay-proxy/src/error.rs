//! Error types for the interception core.

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error from the upstream client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive lookup could not be handed to the lookup service.
    #[error("Lookup dispatch failed: {0}")]
    Dispatch(String),

    /// A blob referenced by an upload body is unknown to the blob store.
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Content rewriting failed.
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),
}

/// Error returned by a content rewriter.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The payload could not be decoded before rewriting.
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// The rewrite rules failed to apply.
    #[error("Failed to rewrite content: {0}")]
    Rules(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
