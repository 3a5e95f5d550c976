//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pipeline metrics (requests by outcome, latency, rewrites)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): requests by outcome and status
//! - `pipeline_request_duration_seconds` (histogram): time spent in the pipeline
//! - `filter_rewrites_total` (counter): completed rewrites per filter
//! - `upstream_retries_total` (counter): retried producer attempts
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const REQUESTS_TOTAL: &str = "pipeline_requests_total";
const REQUEST_DURATION: &str = "pipeline_request_duration_seconds";
const FILTER_REWRITES: &str = "filter_rewrites_total";
const UPSTREAM_RETRIES: &str = "upstream_retries_total";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
        .install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// One request leaving the pipeline.
pub fn record_request(outcome: &'static str, status: u16, start: Instant) {
    metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION, "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_filter_rewrite(filter: &str) {
    metrics::counter!(FILTER_REWRITES, "filter" => filter.to_string()).increment(1);
}

pub fn record_upstream_retry(producer: &str) {
    metrics::counter!(UPSTREAM_RETRIES, "producer" => producer.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_request("filtered", 200, Instant::now());
            record_filter_rewrite("links");
            record_filter_rewrite("links");
            record_upstream_retry("origin");
        });

        let rendered = handle.render();
        let requests = rendered
            .lines()
            .find(|l| l.starts_with("pipeline_requests_total{"))
            .unwrap();
        assert!(requests.contains(r#"outcome="filtered""#));
        assert!(requests.contains(r#"status="200""#));
        assert!(requests.ends_with(" 1"));
        assert!(rendered.contains(r#"filter_rewrites_total{filter="links"} 2"#));
        assert!(rendered.contains(r#"upstream_retries_total{producer="origin"} 1"#));
        assert!(rendered.contains("pipeline_request_duration_seconds"));
    }
}
