//! Response filters.
//!
//! # Data Flow
//! ```text
//! ResponseHead from producer
//!     → interested() on every filter, in chain order (may edit headers)
//!     → InterestSet (positions that said yes)
//!     → body fetched once, only if the set is non-empty
//!     → rewrite() on each interested filter, output feeding the next
//! ```
//!
//! # Design Decisions
//! - A filter decides from headers alone; the body is never fetched just to ask
//! - Abort is a value (`Rewrite::Aborted`), not an error and not an empty body
//! - Content-Length is the orchestrator's job, not the filter's
//! - Filters are shared across requests; per-request state goes in
//!   `RequestContext::attributes` under the filter's name

pub mod append;
pub mod block;
pub mod chain;
pub mod deny;
pub mod gzip;
pub mod replace;
pub mod set_header;

use async_trait::async_trait;
use bytes::Bytes;

use crate::handler::{Handler, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

pub use chain::{FilterChain, InterestSet};

/// Outcome of one rewrite stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Body for the next stage (may be the input unchanged, or empty).
    Rewritten(Bytes),
    /// Stop the chain and deliver no content.
    Aborted,
}

/// A chain-composable unit that may rewrite a response body.
#[async_trait]
pub trait Filter: Handler {
    /// Decide from the response headers whether to see the body.
    ///
    /// Header edits made here are kept and are visible to later filters.
    fn interested(
        &self,
        ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError>;

    /// Transform the body produced by the previous stage.
    async fn rewrite(
        &self,
        ctx: &mut RequestContext,
        headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError>;
}

/// Shared matching for filters scoped by media type.
///
/// An entry ending in `/` matches a whole family (`text/`), anything else is
/// an exact media type. An empty list matches everything, including
/// responses without a Content-Type.
pub(crate) fn content_type_matches(patterns: &[String], headers: &HeaderSet) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(media) = headers.content_type() else {
        return false;
    };
    patterns.iter().any(|p| {
        let p = p.trim().to_ascii_lowercase();
        if p.ends_with('/') {
            media.starts_with(&p)
        } else {
            media == p
        }
    })
}
