//! Resilience for upstream producers.
//!
//! # Data Flow
//! ```text
//! Attempt against the origin:
//!     → per-attempt timeout (producer settings)
//!     → On failure: retries.rs (retryable? budget left?)
//!     → backoff.rs (exponential delay with jitter) → next attempt
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - Filter failures are never retried

pub mod backoff;
pub mod retries;
