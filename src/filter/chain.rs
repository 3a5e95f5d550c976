//! Ordered filter chain.
//!
//! # Responsibilities
//! - Hold the configured filters in application order
//! - Build the chain once from configuration through the registry
//! - Track which positions took interest in the current response
//!
//! # Design Decisions
//! - Immutable after construction; cloned cheaply via `Arc` into every request
//! - Order is configuration order; there is no priority or reordering

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::filter::Filter;
use crate::handler::HandlerConfig;
use crate::pipeline::registry::Registry;

/// Immutable, shared, ordered list of filters.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl FilterChain {
    /// Freeze already-initialized filters into a chain.
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    /// Construct and initialize every configured filter, in order.
    pub fn from_config(configs: &[HandlerConfig], registry: &Registry) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut filters = Vec::with_capacity(configs.len());

        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(ConfigError::DuplicateName(config.name.clone()));
            }
            let filter = registry.build_filter(config)?;
            tracing::info!(
                filter = %config.name,
                kind = %config.kind,
                position = filters.len(),
                "Filter initialized"
            );
            filters.push(filter);
        }

        Ok(Self::new(filters))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Arc<dyn Filter>> {
        self.filters.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.iter()
    }

    /// Filter names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Chain positions that declared interest for one response.
///
/// Positions are recorded in ascending order as the chain is polled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSet {
    positions: Vec<usize>,
}

impl InterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, position: usize) {
        debug_assert!(self.positions.last().map_or(true, |&last| last < position));
        self.positions.push(position);
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.binary_search(&position).is_ok()
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}
