//! Content producers: where responses originate.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → produce_headers()  status + HeaderSet, body still pending
//!     → either produce_body()  full body, bounded, for the filtered path
//!       or     stream_body()   body passed through untouched (fast path)
//! ```
//!
//! # Design Decisions
//! - Headers and body are separate calls so the body is only fetched on demand
//! - Whatever a producer must keep between the two calls lives in the
//!   request's attribute bag under the producer's name
//! - Exactly one of `produce_body` / `stream_body` is called per request

pub mod files;
pub mod fixed;
pub mod upstream;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use bytes::Bytes;

use crate::handler::{Handler, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

pub use files::FileProducer;
pub use fixed::StaticProducer;
pub use upstream::UpstreamProducer;

/// Status line and headers of a produced response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderSet,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderSet) -> Self {
        Self { status, headers }
    }
}

/// Origin of response headers and bytes.
#[async_trait]
pub trait ContentProducer: Handler {
    /// Produce the status and headers; the body stays pending.
    async fn produce_headers(&self, ctx: &mut RequestContext) -> Result<ResponseHead, HandlerError>;

    /// Materialize the full body.
    async fn produce_body(&self, ctx: &mut RequestContext) -> Result<Bytes, HandlerError>;

    /// Hand the body over without buffering it.
    async fn stream_body(&self, ctx: &mut RequestContext) -> Result<Body, HandlerError>;
}
