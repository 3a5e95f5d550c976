//! Per-request state threaded through the pipeline.
//!
//! # Responsibilities
//! - Carry request metadata (method, path, query, headers, body, request id)
//! - Record the producer's status once headers are known
//! - Offer a typed attribute bag so stages can pass data to later stages
//! - Carry the cancellation token checked between filter stages
//!
//! # Design Decisions
//! - Attributes are keyed by owner name + type, so two filters storing the
//!   same type never see each other's values
//! - One context per request, owned by that request's task; never shared

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::{Method, StatusCode, Uri};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::http::headers::HeaderSet;

/// Header carrying the request id, set by the request id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Typed per-request attribute bag keyed by owner identity.
#[derive(Default)]
pub struct Attributes {
    values: HashMap<(String, TypeId), Box<dyn Any + Send>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `owner`, returning the previous value of the same type.
    pub fn insert<T: Any + Send>(&mut self, owner: &str, value: T) -> Option<T> {
        self.values
            .insert((owner.to_string(), TypeId::of::<T>()), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send>(&self, owner: &str) -> Option<&T> {
        self.values
            .get(&(owner.to_string(), TypeId::of::<T>()))
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self, owner: &str) -> Option<&mut T> {
        self.values
            .get_mut(&(owner.to_string(), TypeId::of::<T>()))
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Take the value out of the bag.
    pub fn remove<T: Any + Send>(&mut self, owner: &str) -> Option<T> {
        self.values
            .remove(&(owner.to_string(), TypeId::of::<T>()))
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attributes")
            .field("len", &self.values.len())
            .finish()
    }
}

/// In-flight request state.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderSet,
    body: Bytes,
    request_id: String,
    peer: Option<SocketAddr>,
    status: Option<StatusCode>,
    cancel: CancellationToken,
    /// Scratch values attached by filters and producers.
    pub attributes: Attributes,
}

impl RequestContext {
    /// Create a context for `method` and `uri` with no headers or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderSet::new(),
            body: Bytes::new(),
            request_id: uuid::Uuid::new_v4().to_string(),
            peer: None,
            status: None,
            cancel: CancellationToken::new(),
            attributes: Attributes::new(),
        }
    }

    /// Use the request headers; adopts `x-request-id` when present.
    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        if let Some(id) = headers.get_str(X_REQUEST_ID) {
            self.request_id = id.to_string();
        }
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus query, as sent on the request line.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// Request headers as received from the client.
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Status the producer answered with, once headers were produced.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
