//! Response filtering pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → filters' try_handle (first answer wins)
//!     → producer try_handle
//!     → producer headers → interest pass (InterestSet)
//!     → empty set:  stream producer body untouched
//!       otherwise:  buffer body → rewrite per interested filter → Content-Length
//!     → Emitted
//! ```

pub mod error;
pub mod orchestrator;
pub mod registry;

pub use error::{Phase, PipelineError};
pub use orchestrator::{Completed, Outcome, Pipeline};
pub use registry::Registry;
