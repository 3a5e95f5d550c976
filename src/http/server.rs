//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router routing every method and path to the pipeline
//! - Wire up middleware (tracing, timeout, request ID)
//! - Buffer the request body within the configured limit
//! - Bind server to listener and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig};
use crate::http::headers::HeaderSet;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::pipeline::{Pipeline, Registry};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_request_body_bytes: usize,
    /// Parent of every request's cancellation token.
    pub cancel: CancellationToken,
}

/// HTTP server fronting the filter pipeline.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server around an already built pipeline.
    pub fn new(config: ProxyConfig, pipeline: Pipeline) -> Self {
        let cancel = CancellationToken::new();
        let state = AppState {
            pipeline: Arc::new(pipeline),
            max_request_body_bytes: config.limits.max_request_body_bytes,
            cancel: cancel.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            cancel,
        }
    }

    /// Build the pipeline described by `config` and wrap it in a server.
    pub fn from_config(config: ProxyConfig, registry: &Registry) -> Result<Self, ConfigError> {
        let pipeline = Pipeline::from_config(&config.filters, &config.producer.0, registry)?;
        tracing::info!(
            filters = ?pipeline.chain().names(),
            producer = %pipeline.producer().name(),
            "Pipeline ready"
        );
        Ok(Self::new(config, pipeline))
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(pipeline_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// The router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Once `shutdown` fires, no new connections are accepted; requests still
    /// in the chain after the grace period are cancelled.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let cancel = self.cancel.clone();
        let signaled = shutdown.signaled();
        let drain = async move {
            signaled.await;
            tracing::info!(grace = ?grace, "Draining in-flight requests");
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                cancel.cancel();
            });
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(drain)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Every request lands here: buffer the body, then run the pipeline.
async fn pipeline_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let headers = HeaderSet::from_header_map(&parts.headers);

    let declared = headers.content_length().unwrap_or(0);
    if declared > state.max_request_body_bytes as u64 {
        tracing::debug!(declared, limit = state.max_request_body_bytes, "Request body too large");
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let body = match axum::body::to_bytes(body, state.max_request_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut ctx = RequestContext::new(parts.method, parts.uri)
        .with_headers(headers)
        .with_body(body)
        .with_cancellation(state.cancel.child_token());
    if let Some(peer) = peer {
        ctx = ctx.with_peer(peer);
    }

    state.pipeline.serve(ctx).await.into_response()
}
