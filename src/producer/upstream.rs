//! Producer forwarding requests to an HTTP origin.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the configured origin
//! - Forward method, headers and buffered body; propagate X-Request-ID
//! - Retry idempotent requests on network errors and 502/503/504
//! - Keep the origin's response body pending until the pipeline asks for it
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped in both directions
//! - Each attempt has its own timeout; the retry budget caps retry storms
//! - Cancellation of the client request aborts an in-flight attempt

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{Authority, Scheme};
use axum::http::{Method, Request, Response, Uri};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;

use crate::config::{ConfigError, RetryConfig};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::observability::metrics;
use crate::producer::{ContentProducer, ResponseHead};
use crate::resilience::backoff::backoff_delay;
use crate::resilience::retries::{is_retryable, RetryBudget};

/// Headers meaningful only for a single connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Retries always allowed per budget window regardless of ratio.
const MIN_RETRIES_PER_WINDOW: u64 = 100;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UpstreamSettings {
    origin: String,
    request_timeout_secs: u64,
    connect_timeout_ms: u64,
    max_body_bytes: usize,
    preserve_host: bool,
    retries: RetryConfig,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            origin: String::new(),
            request_timeout_secs: 30,
            connect_timeout_ms: 5000,
            max_body_bytes: 8 * 1024 * 1024,
            preserve_host: false,
            retries: RetryConfig::default(),
        }
    }
}

/// Origin response body, held between `produce_headers` and the body call.
struct Pending(Body);

pub struct UpstreamProducer {
    name: String,
    origin: Authority,
    request_timeout: Duration,
    max_body_bytes: usize,
    preserve_host: bool,
    retries: RetryConfig,
    budget: Arc<RetryBudget>,
    client: Client<HttpConnector, Body>,
}

impl std::fmt::Debug for UpstreamProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamProducer")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("request_timeout", &self.request_timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

fn build_client(connect_timeout: Duration) -> Client<HttpConnector, Body> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

impl Default for UpstreamProducer {
    fn default() -> Self {
        let settings = UpstreamSettings::default();
        Self {
            name: String::new(),
            origin: Authority::from_static("127.0.0.1:80"),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            max_body_bytes: settings.max_body_bytes,
            preserve_host: settings.preserve_host,
            budget: Arc::new(RetryBudget::new(
                settings.retries.budget_ratio,
                MIN_RETRIES_PER_WINDOW,
            )),
            retries: settings.retries,
            client: build_client(Duration::from_millis(settings.connect_timeout_ms)),
        }
    }
}

impl UpstreamProducer {
    /// Producer for `origin` ("host:port") with default timeouts and retries.
    pub fn new(name: impl Into<String>, origin: Authority) -> Self {
        Self {
            name: name.into(),
            origin,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: RetryConfig) -> Self {
        self.budget = Arc::new(RetryBudget::new(retries.budget_ratio, MIN_RETRIES_PER_WINDOW));
        self.retries = retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn target_uri(&self, uri: &Uri) -> Result<Uri, HandlerError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.origin.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some("/".parse().map_err(|e| {
                HandlerError::with_source("invalid request path", e)
            })?);
        }
        Uri::from_parts(parts).map_err(|e| HandlerError::with_source("invalid upstream URI", e))
    }

    /// Headers sent to the origin for this request.
    fn forward_headers(&self, incoming: &HeaderSet, request_id: &str, peer: Option<SocketAddr>) -> HeaderMap {
        let listed = connection_listed(incoming);
        let mut headers = HeaderMap::with_capacity(incoming.len() + 2);
        for (name, value) in incoming.iter() {
            let skip = is_hop_by_hop(name.as_str())
                || listed.iter().any(|l| l == name.as_str())
                || *name == header::CONTENT_LENGTH
                || (*name == header::HOST && !self.preserve_host);
            if !skip {
                headers.append(name.clone(), value.clone());
            }
        }

        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
        }

        if let Some(peer) = peer {
            let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {}", peer.ip()),
                None => peer.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
            }
        }
        headers
    }

    async fn send(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Response<Incoming>, HandlerError> {
        let mut request = Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(Body::from(body.clone()))
            .map_err(|e| HandlerError::with_source("failed to build upstream request", e))?;
        *request.headers_mut() = headers.clone();

        match tokio::time::timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(HandlerError::with_source(
                format!("request to {} failed", self.origin),
                e,
            )),
            Err(_) => Err(HandlerError::new(format!(
                "request to {} timed out after {:?}",
                self.origin, self.request_timeout
            ))),
        }
    }

    /// Send with retries; returns the final response or the last error.
    async fn send_with_retries(
        &self,
        request_id: &str,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Response<Incoming>, HandlerError> {
        let max_attempts = if self.retries.enabled {
            self.retries.max_attempts.max(1)
        } else {
            1
        };
        self.budget.record_request();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.send(method, uri, headers, body).await;

            let retryable = match &result {
                Ok(response) => is_retryable(method, Some(response.status()), false),
                Err(_) => is_retryable(method, None, true),
            };
            if attempt >= max_attempts || !retryable || !self.budget.can_retry() {
                if let Err(e) = &result {
                    tracing::error!(
                        request_id = %request_id,
                        producer = %self.name,
                        attempt,
                        error = %e,
                        "Upstream error"
                    );
                }
                return result;
            }

            let delay = backoff_delay(&self.retries, attempt);
            match &result {
                Ok(response) => tracing::info!(
                    request_id = %request_id,
                    attempt,
                    delay = ?delay,
                    status = %response.status(),
                    "Retrying upstream request"
                ),
                Err(e) => tracing::info!(
                    request_id = %request_id,
                    attempt,
                    delay = ?delay,
                    error = %e,
                    "Retrying after network error"
                ),
            }
            metrics::record_upstream_retry(&self.name);
            drop(result);
            tokio::time::sleep(delay).await;
        }
    }

    fn take_pending(&self, ctx: &mut RequestContext) -> Result<Body, HandlerError> {
        ctx.attributes
            .remove::<Pending>(&self.name)
            .map(|p| p.0)
            .ok_or_else(|| HandlerError::new("body requested before headers"))
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Extra hop-by-hop names listed in the Connection header.
fn connection_listed(headers: &HeaderSet) -> Vec<String> {
    headers
        .get_all("connection")
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[async_trait]
impl Handler for UpstreamProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: UpstreamSettings = config.parse_settings()?;
        let invalid = |message: String| ConfigError::Handler {
            name: config.name.clone(),
            message,
        };
        if settings.origin.is_empty() {
            return Err(invalid("origin is required".to_string()));
        }
        if settings.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be positive".to_string()));
        }
        self.origin = Authority::from_str(&settings.origin)
            .map_err(|e| invalid(format!("invalid origin {:?}: {e}", settings.origin)))?;
        self.name = config.name.clone();
        self.request_timeout = Duration::from_secs(settings.request_timeout_secs);
        self.max_body_bytes = settings.max_body_bytes;
        self.preserve_host = settings.preserve_host;
        self.client = build_client(Duration::from_millis(settings.connect_timeout_ms));
        self.budget = Arc::new(RetryBudget::new(
            settings.retries.budget_ratio,
            MIN_RETRIES_PER_WINDOW,
        ));
        self.retries = settings.retries;
        Ok(())
    }
}

#[async_trait]
impl ContentProducer for UpstreamProducer {
    async fn produce_headers(&self, ctx: &mut RequestContext) -> Result<ResponseHead, HandlerError> {
        let request_id = ctx.request_id().to_string();
        let method = ctx.method().clone();
        let uri = self.target_uri(ctx.uri())?;
        let headers = self.forward_headers(ctx.headers(), &request_id, ctx.peer());
        let body = ctx.body().clone();
        let cancel = ctx.cancellation().clone();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "Forwarding to upstream"
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(HandlerError::new("client went away"));
            }
            result = self.send_with_retries(&request_id, &method, &uri, &headers, &body) => result?,
        };

        let (parts, incoming) = response.into_parts();
        let listed: Vec<String> = parts
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .collect();
        let mut headers = HeaderSet::from_header_map(&parts.headers);
        for name in HOP_BY_HOP.iter().copied().chain(listed.iter().map(String::as_str)) {
            headers.remove(name);
        }

        ctx.attributes.insert(&self.name, Pending(Body::new(incoming)));
        Ok(ResponseHead::new(parts.status, headers))
    }

    async fn produce_body(&self, ctx: &mut RequestContext) -> Result<Bytes, HandlerError> {
        let body = self.take_pending(ctx)?;
        axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| HandlerError::with_source("failed to read upstream body", e))
    }

    async fn stream_body(&self, ctx: &mut RequestContext) -> Result<Body, HandlerError> {
        self.take_pending(ctx)
    }
}
