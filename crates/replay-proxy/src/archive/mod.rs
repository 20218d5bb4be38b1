//! Archive replay.
//!
//! Replay requests are answered by an external archive service over a
//! request/reply channel:
//!
//! ```text
//! resolve(request)
//!     │ register token ──► PendingResolutions
//!     │ dispatch ────────► LookupChannel ──► archive service
//!     │                                          │
//!     │ await reply ◄──── fulfill(token, reply) ◄┘
//!     ▼
//! Rewriter ──► Range slicing ──► InterceptedResponse
//! ```

mod context;
mod pending;
mod resolver;
mod rewrite;

pub use context::{ArchiveContext, ArchiveCoordinates};
pub use pending::{LookupChannel, LookupReply, LookupRequest, PendingResolutions};
pub use resolver::{ArchiveResolver, ResolverConfig};
pub use rewrite::{ArchiveResponse, PassthroughRewriter, RewritePolicy, Rewriter};
