//! Final response handed to the transport.
//!
//! # Responsibilities
//! - Represent what the pipeline emits for one request (status, headers, body)
//! - Convert that into an axum response
//! - Map pipeline faults to generic error responses
//!
//! # Design Decisions
//! - Streamed bodies pass through untouched (fast path)
//! - Error responses never carry partially filtered content

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::http::headers::HeaderSet;

/// Body of an emitted response.
#[derive(Debug)]
pub enum EmittedBody {
    /// Materialized body; Content-Length matches its length.
    Full(Bytes),
    /// Producer body passed through without buffering.
    Streamed(Body),
    /// No body is delivered.
    Empty,
}

impl EmittedBody {
    /// Materialized bytes, if the body is not streamed.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            EmittedBody::Full(bytes) => Some(bytes),
            EmittedBody::Empty => Some(&[]),
            EmittedBody::Streamed(_) => None,
        }
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self, EmittedBody::Streamed(_))
    }
}

/// A response ready for the transport layer.
#[derive(Debug)]
pub struct Emitted {
    pub status: StatusCode,
    pub headers: HeaderSet,
    pub body: EmittedBody,
}

impl Emitted {
    /// A complete response with a materialized body and exact Content-Length.
    pub fn full(status: StatusCode, mut headers: HeaderSet, body: Bytes) -> Self {
        headers.remove(header::TRANSFER_ENCODING.as_str());
        headers.set_content_length(body.len() as u64);
        Self {
            status,
            headers,
            body: EmittedBody::Full(body),
        }
    }

    /// Headers only; Content-Length is pinned to zero.
    pub fn empty(status: StatusCode, mut headers: HeaderSet) -> Self {
        headers.remove(header::TRANSFER_ENCODING.as_str());
        headers.set_content_length(0);
        Self {
            status,
            headers,
            body: EmittedBody::Empty,
        }
    }

    /// Producer headers and body passed straight through.
    pub fn streamed(status: StatusCode, headers: HeaderSet, body: Body) -> Self {
        Self {
            status,
            headers,
            body: EmittedBody::Streamed(body),
        }
    }

    /// Short plain-text answer, used by terminal handlers and error mapping.
    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        let mut headers = HeaderSet::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::full(status, headers, Bytes::from(message.into()))
    }
}

impl IntoResponse for Emitted {
    fn into_response(self) -> Response {
        let body = match self.body {
            EmittedBody::Full(bytes) => Body::from(bytes),
            EmittedBody::Streamed(body) => body,
            EmittedBody::Empty => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.into_header_map();
        response
    }
}

/// Generic answer for a request whose filter chain failed.
pub fn filter_fault() -> Emitted {
    Emitted::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

/// Generic answer for a request whose producer failed.
pub fn upstream_fault() -> Emitted {
    Emitted::text(StatusCode::BAD_GATEWAY, "Bad Gateway")
}

/// Answer for a request cancelled before the chain completed.
pub fn cancelled() -> Emitted {
    Emitted::text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderName;

    #[test]
    fn test_full_sets_exact_length() {
        let mut headers = HeaderSet::new();
        headers.set_content_length(999);
        headers.insert(
            HeaderName::from_static("transfer-encoding"),
            HeaderValue::from_static("chunked"),
        );

        let emitted = Emitted::full(StatusCode::OK, headers, Bytes::from_static(b"hello"));
        assert_eq!(emitted.headers.content_length(), Some(5));
        assert!(!emitted.headers.contains("transfer-encoding"));
        assert_eq!(emitted.body.as_bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_empty_has_zero_length() {
        let emitted = Emitted::empty(StatusCode::OK, HeaderSet::new());
        assert_eq!(emitted.headers.content_length(), Some(0));
        assert_eq!(emitted.body.as_bytes(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_into_response() {
        let emitted = Emitted::text(StatusCode::FORBIDDEN, "nope");
        let response = emitted.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["content-length"], "4");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"nope");
    }
}
