//! Handler kinds known to the server.
//!
//! # Responsibilities
//! - Map a configured `kind` to a constructor for a filter or producer
//! - Build and initialize handlers from their config entries
//!
//! # Design Decisions
//! - Constructors build an unconfigured handler; `initialize` does the rest
//! - Custom kinds are registered before the chain is built, never after

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::filter::append::AppendFilter;
use crate::filter::block::BlockFilter;
use crate::filter::deny::DenyFilter;
use crate::filter::gzip::GzipFilter;
use crate::filter::replace::ReplaceFilter;
use crate::filter::set_header::SetHeaderFilter;
use crate::filter::Filter;
use crate::handler::HandlerConfig;
use crate::producer::{ContentProducer, FileProducer, StaticProducer, UpstreamProducer};

pub type FilterConstructor = fn() -> Box<dyn Filter>;
pub type ProducerConstructor = fn() -> Box<dyn ContentProducer>;

/// Kind name → constructor tables.
#[derive(Default)]
pub struct Registry {
    filters: HashMap<String, FilterConstructor>,
    producers: HashMap<String, ProducerConstructor>,
}

impl Registry {
    /// Empty registry with no kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter and producer kind.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_filter("replace", || Box::new(ReplaceFilter::default()));
        registry.register_filter("append", || Box::new(AppendFilter::default()));
        registry.register_filter("set-header", || Box::new(SetHeaderFilter::default()));
        registry.register_filter("block", || Box::new(BlockFilter::default()));
        registry.register_filter("deny", || Box::new(DenyFilter::default()));
        registry.register_filter("gzip", || Box::new(GzipFilter::default()));

        registry.register_producer("upstream", || Box::new(UpstreamProducer::default()));
        registry.register_producer("static", || Box::new(StaticProducer::default()));
        registry.register_producer("files", || Box::new(FileProducer::default()));
        registry
    }

    /// Add or replace a filter kind.
    pub fn register_filter(&mut self, kind: impl Into<String>, constructor: FilterConstructor) {
        self.filters.insert(kind.into(), constructor);
    }

    /// Add or replace a producer kind.
    pub fn register_producer(&mut self, kind: impl Into<String>, constructor: ProducerConstructor) {
        self.producers.insert(kind.into(), constructor);
    }

    pub fn filter_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.filters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn producer_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.producers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn build_filter(&self, config: &HandlerConfig) -> Result<Arc<dyn Filter>, ConfigError> {
        let constructor = self.filters.get(&config.kind).ok_or_else(|| ConfigError::UnknownKind {
            name: config.name.clone(),
            role: "filter",
            kind: config.kind.clone(),
        })?;
        let mut filter = constructor();
        filter.initialize(config)?;
        Ok(Arc::from(filter))
    }

    pub fn build_producer(
        &self,
        config: &HandlerConfig,
    ) -> Result<Arc<dyn ContentProducer>, ConfigError> {
        let constructor =
            self.producers
                .get(&config.kind)
                .ok_or_else(|| ConfigError::UnknownKind {
                    name: config.name.clone(),
                    role: "producer",
                    kind: config.kind.clone(),
                })?;
        let mut producer = constructor();
        producer.initialize(config)?;
        tracing::info!(
            producer = %config.name,
            kind = %config.kind,
            "Producer initialized"
        );
        Ok(Arc::from(producer))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("filters", &self.filter_kinds())
            .field("producers", &self.producer_kinds())
            .finish()
    }
}
