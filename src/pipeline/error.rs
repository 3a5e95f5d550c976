//! Request-scoped pipeline failures.

use std::fmt;

use crate::handler::HandlerError;
use crate::http::response::{self, Emitted};

/// Filter hook that was running when a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TryHandle,
    Interested,
    Rewrite,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::TryHandle => "try_handle",
            Phase::Interested => "interested",
            Phase::Rewrite => "rewrite",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request could not be completed.
///
/// An aborted response is not an error; see [`crate::filter::Rewrite::Aborted`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A filter failed; surfaced as 500.
    #[error("filter '{filter}' failed in {phase}: {source}")]
    Filter {
        filter: String,
        phase: Phase,
        #[source]
        source: HandlerError,
    },

    /// The content producer failed; surfaced as 502.
    #[error("producer '{producer}' failed: {source}")]
    Upstream {
        producer: String,
        #[source]
        source: HandlerError,
    },

    /// The request was cancelled before the chain completed.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn filter(name: &str, phase: Phase, source: HandlerError) -> Self {
        PipelineError::Filter {
            filter: name.to_string(),
            phase,
            source,
        }
    }

    /// Metrics label for the failure class.
    pub fn outcome(&self) -> &'static str {
        match self {
            PipelineError::Filter { .. } => "filter_error",
            PipelineError::Upstream { .. } => "upstream_error",
            PipelineError::Cancelled => "cancelled",
        }
    }

    /// Generic response replacing whatever the chain had produced.
    pub fn to_response(&self) -> Emitted {
        match self {
            PipelineError::Filter { .. } => response::filter_fault(),
            PipelineError::Upstream { .. } => response::upstream_fault(),
            PipelineError::Cancelled => response::cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_mapping() {
        let filter = PipelineError::Filter {
            filter: "links".to_string(),
            phase: Phase::Rewrite,
            source: HandlerError::new("bad utf-8"),
        };
        assert_eq!(filter.to_string(), "filter 'links' failed in rewrite: bad utf-8");
        assert_eq!(filter.to_response().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(filter.outcome(), "filter_error");

        let upstream = PipelineError::Upstream {
            producer: "origin".to_string(),
            source: HandlerError::new("refused"),
        };
        assert_eq!(upstream.to_response().status, StatusCode::BAD_GATEWAY);
        assert_eq!(PipelineError::Cancelled.to_response().status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
