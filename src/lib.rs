//! Filtering reverse proxy library.
//!
//! Responses come from a [`producer::ContentProducer`] and pass through an
//! ordered [`filter::FilterChain`] driven by [`pipeline::Pipeline`].

pub mod config;
pub mod filter;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod producer;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Pipeline, Registry};
