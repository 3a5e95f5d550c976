//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, timeout, body limit)
//!     → request.rs (RequestContext: metadata, body, attributes)
//!     → [pipeline: filters around a content producer]
//!     → headers.rs (ordered, case-insensitive response headers)
//!     → response.rs (Emitted → axum Response)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use headers::HeaderSet;
pub use request::{RequestContext, X_REQUEST_ID};
pub use response::{Emitted, EmittedBody};
pub use server::HttpServer;
