//! Per-request driver of the filter chain around a content producer.
//!
//! # Responsibilities
//! - Give every filter, then the producer, a chance to answer outright
//! - Fetch response headers and poll each filter's interest
//! - Stream the producer body untouched when nobody is interested
//! - Otherwise buffer the body and run interested filters in chain order
//! - Keep Content-Length equal to what is actually emitted
//!
//! # Design Decisions
//! - One sequential pass per request; no stage runs concurrently with another
//! - Header mutations are applied to a single `HeaderSet`, so every later
//!   filter sees them immediately
//! - An abort is an ordinary outcome; faults replace the whole response
//! - Bodiless responses (HEAD, 1xx/204/304) are polled for interest but
//!   always take the streaming path

use std::sync::Arc;
use std::time::Instant;

use axum::http::{Method, StatusCode};

use crate::config::ConfigError;
use crate::filter::{FilterChain, InterestSet, Rewrite};
use crate::handler::{HandlerConfig, HandlerError};
use crate::http::request::RequestContext;
use crate::http::response::Emitted;
use crate::observability::metrics;
use crate::pipeline::error::{Phase, PipelineError};
use crate::pipeline::registry::Registry;
use crate::producer::{ContentProducer, ResponseHead};

/// How a request left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A filter or the producer answered in `try_handle`.
    Terminal,
    /// No filter was interested; the body was streamed.
    Passthrough,
    /// The body went through every interested filter.
    Filtered,
    /// A filter aborted; headers only.
    Aborted,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Terminal => "terminal",
            Outcome::Passthrough => "passthrough",
            Outcome::Filtered => "filtered",
            Outcome::Aborted => "aborted",
        }
    }
}

/// Result of a successful pass.
#[derive(Debug)]
pub struct Completed {
    pub outcome: Outcome,
    pub response: Emitted,
}

impl Completed {
    fn new(outcome: Outcome, response: Emitted) -> Self {
        Self { outcome, response }
    }
}

/// A frozen filter chain bound to its content producer.
pub struct Pipeline {
    chain: FilterChain,
    producer: Arc<dyn ContentProducer>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("chain", &self.chain)
            .field("producer", &self.producer.name())
            .finish()
    }
}

/// Statuses and methods that never carry a response body.
fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

impl Pipeline {
    pub fn new(chain: FilterChain, producer: Arc<dyn ContentProducer>) -> Self {
        Self { chain, producer }
    }

    /// Build the chain and producer from their config entries.
    pub fn from_config(
        filters: &[HandlerConfig],
        producer: &HandlerConfig,
        registry: &Registry,
    ) -> Result<Self, ConfigError> {
        if let Some(clash) = filters.iter().find(|f| f.name == producer.name) {
            return Err(ConfigError::DuplicateName(clash.name.clone()));
        }
        let chain = FilterChain::from_config(filters, registry)?;
        let producer = registry.build_producer(producer)?;
        Ok(Self::new(chain, producer))
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn producer(&self) -> &Arc<dyn ContentProducer> {
        &self.producer
    }

    fn producer_error(&self, ctx: &RequestContext, source: HandlerError) -> PipelineError {
        if ctx.is_cancelled() {
            return PipelineError::Cancelled;
        }
        PipelineError::Upstream {
            producer: self.producer.name().to_string(),
            source,
        }
    }

    /// Run one request through the chain.
    pub async fn process(&self, ctx: &mut RequestContext) -> Result<Completed, PipelineError> {
        for filter in self.chain.iter() {
            let answer = filter
                .try_handle(ctx)
                .await
                .map_err(|e| PipelineError::filter(filter.name(), Phase::TryHandle, e))?;
            if let Some(response) = answer {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    filter = %filter.name(),
                    status = %response.status,
                    "Filter answered request"
                );
                return Ok(Completed::new(Outcome::Terminal, response));
            }
        }

        match self.producer.try_handle(ctx).await {
            Ok(Some(response)) => return Ok(Completed::new(Outcome::Terminal, response)),
            Ok(None) => {}
            Err(e) => return Err(self.producer_error(ctx, e)),
        }

        let ResponseHead { status, mut headers } = match self.producer.produce_headers(ctx).await {
            Ok(head) => head,
            Err(e) => return Err(self.producer_error(ctx, e)),
        };
        ctx.set_status(status);

        let mut interest = InterestSet::new();
        for (position, filter) in self.chain.iter().enumerate() {
            let interested = filter
                .interested(ctx, &mut headers)
                .map_err(|e| PipelineError::filter(filter.name(), Phase::Interested, e))?;
            if interested {
                interest.push(position);
            }
        }

        if interest.is_empty() || is_bodiless(ctx.method(), status) {
            let body = match self.producer.stream_body(ctx).await {
                Ok(body) => body,
                Err(e) => return Err(self.producer_error(ctx, e)),
            };
            return Ok(Completed::new(
                Outcome::Passthrough,
                Emitted::streamed(status, headers, body),
            ));
        }

        tracing::debug!(
            request_id = %ctx.request_id(),
            interested = ?interest.positions(),
            "Buffering body for filters"
        );

        let mut body = match self.producer.produce_body(ctx).await {
            Ok(body) => body,
            Err(e) => return Err(self.producer_error(ctx, e)),
        };

        for &position in interest.positions() {
            let Some(filter) = self.chain.get(position) else {
                continue;
            };
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let rewritten = filter
                .rewrite(ctx, &mut headers, body)
                .await
                .map_err(|e| PipelineError::filter(filter.name(), Phase::Rewrite, e))?;
            match rewritten {
                Rewrite::Rewritten(next) => {
                    metrics::record_filter_rewrite(filter.name());
                    body = next;
                }
                Rewrite::Aborted => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        filter = %filter.name(),
                        "Filter aborted response"
                    );
                    return Ok(Completed::new(Outcome::Aborted, Emitted::empty(status, headers)));
                }
            }
        }

        Ok(Completed::new(Outcome::Filtered, Emitted::full(status, headers, body)))
    }

    /// Run a request and turn any fault into its generic response.
    pub async fn serve(&self, mut ctx: RequestContext) -> Emitted {
        let start = Instant::now();
        let request_id = ctx.request_id().to_string();

        let (outcome, response) = match self.process(&mut ctx).await {
            Ok(completed) => (completed.outcome.as_str(), completed.response),
            Err(err) => {
                match &err {
                    PipelineError::Cancelled => tracing::warn!(
                        request_id = %request_id,
                        "Request cancelled before the chain completed"
                    ),
                    PipelineError::Filter { filter, phase, source } => tracing::error!(
                        request_id = %request_id,
                        filter = %filter,
                        phase = %phase,
                        error = %source,
                        "Filter failed"
                    ),
                    PipelineError::Upstream { producer, source } => tracing::error!(
                        request_id = %request_id,
                        producer = %producer,
                        error = %source,
                        "Producer failed"
                    ),
                }
                (err.outcome(), err.to_response())
            }
        };

        metrics::record_request(outcome, response.status.as_u16(), start);
        response
    }
}
