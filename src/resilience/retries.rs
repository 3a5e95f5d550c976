//! Retry logic.
//!
//! # Responsibilities
//! - Determine if an upstream attempt is retryable (idempotent methods only)
//! - Enforce a retry budget (retries as a fraction of requests per window)
//!
//! # Design Decisions
//! - Never retry POST/PATCH (non-idempotent)
//! - Connection errors and timeouts always retryable; 502/503/504 retryable
//! - Retry budget prevents retry storms under load
//! - Filters are never retried; this only covers producer attempts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};

/// Length of the window the budget is computed over.
const BUDGET_WINDOW: Duration = Duration::from_secs(10);

/// Whether another attempt may be made after this outcome.
pub fn is_retryable(method: &Method, status: Option<StatusCode>, network_error: bool) -> bool {
    if !method.is_idempotent() {
        return false;
    }
    if network_error {
        return true;
    }
    matches!(
        status,
        Some(StatusCode::BAD_GATEWAY)
            | Some(StatusCode::SERVICE_UNAVAILABLE)
            | Some(StatusCode::GATEWAY_TIMEOUT)
    )
}

/// Caps retries to a ratio of requests seen in the current window.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f32,
    min_retries: u64,
    window_start: Mutex<Instant>,
    requests: AtomicU64,
    retries: AtomicU64,
}

impl RetryBudget {
    /// `ratio` of requests may be retried, plus `min_retries` per window.
    pub fn new(ratio: f32, min_retries: u64) -> Self {
        Self {
            ratio: ratio.max(0.0),
            min_retries,
            window_start: Mutex::new(Instant::now()),
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    fn roll_window(&self) {
        let mut start = self.window_start.lock().unwrap_or_else(|e| e.into_inner());
        if start.elapsed() >= BUDGET_WINDOW {
            *start = Instant::now();
            self.requests.store(0, Ordering::Relaxed);
            self.retries.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_request(&self) {
        self.roll_window();
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take one retry from the budget; false when it is exhausted.
    pub fn can_retry(&self) -> bool {
        self.roll_window();
        let requests = self.requests.load(Ordering::Relaxed);
        let allowed = self.min_retries + (requests as f64 * self.ratio as f64) as u64;
        let used = self.retries.fetch_add(1, Ordering::Relaxed);
        if used < allowed {
            true
        } else {
            self.retries.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }
}
