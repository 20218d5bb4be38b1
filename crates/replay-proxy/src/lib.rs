//! Replay Proxy - request interception router for the archive replay app.
//!
//! Every request the embedded browser makes is handed to [`RequestRouter`],
//! which answers it from one of three places: the application's own UI
//! bundle on disk, an external archive service, or the live network.
//!
//! ## Features
//!
//! - Serves the UI bundle from the local origin with HTTP range support
//! - Replays archived pages under `<origin>w/<collection>/<timestamp>/<url>`
//! - Catches archived pages leaking requests to the live web
//! - Correlates asynchronous archive lookups by token
//! - Reads local archive files through the `file2:` scheme
//!
//! ## Architecture
//!
//! ```text
//! Intercepted Request → RequestRouter::classify
//!                              │
//!       ┌──────────────┬───────┴───────┬────────────────┐
//!       │ file2:       │ <origin>w/    │ <origin>other  │ elsewhere
//!       ▼              ▼               ▼                ▼
//!  FileResponder  ArchiveResolver  FileResponder   Referrer replayed?
//!                      ▲          (UI bundle)          │
//!                      │                        ┌──────┴──────┐
//!                      │                        │ Yes         │ No
//!                      └────────────────────────┘             ▼
//!                                                         LiveProxy
//! ```

pub mod archive;
mod config;
mod error;
mod files;
mod live;
pub mod navigation;
mod not_found;
mod range;
mod request;
mod router;

pub use archive::{
    ArchiveContext, ArchiveCoordinates, ArchiveResolver, ArchiveResponse, LookupChannel,
    LookupReply, LookupRequest, PassthroughRewriter, PendingResolutions, ResolverConfig,
    RewritePolicy, Rewriter,
};
pub use config::{RouterConfig, DOCS_URL, FILE_PROTOCOL, REPLAY_PATH};
pub use error::{ProxyError, Result, RewriteError};
pub use files::FileResponder;
pub use live::{BlobStore, LiveProxy, MemoryBlobStore};
pub use navigation::{launch_url, window_open_action, LaunchTarget, WindowOpenAction};
pub use not_found::{not_found, NOT_FOUND_CONTENT_TYPE};
pub use range::{parse_range, RangeResult};
pub use request::{InterceptedRequest, InterceptedResponse, ResponseBody, UploadChunk};
pub use router::{classify, parse_replay_url, RequestRouter, Route};

/// Default port of the application's local origin.
pub const DEFAULT_ORIGIN_PORT: u16 = 5471;
