//! Suppresses responses whose body matches a forbidden pattern.

use async_trait::async_trait;
use bytes::Bytes;
use regex::bytes::RegexSet;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{content_type_matches, Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BlockSettings {
    content_types: Vec<String>,
    patterns: Vec<String>,
}

#[derive(Debug)]
pub struct BlockFilter {
    name: String,
    content_types: Vec<String>,
    patterns: RegexSet,
}

impl Default for BlockFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            content_types: Vec::new(),
            patterns: RegexSet::empty(),
        }
    }
}

impl BlockFilter {
    pub fn new(name: impl Into<String>, patterns: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            content_types: Vec::new(),
            patterns: RegexSet::new(patterns)?,
        })
    }
}

#[async_trait]
impl Handler for BlockFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: BlockSettings = config.parse_settings()?;
        let patterns = RegexSet::new(&settings.patterns).map_err(|e| ConfigError::Handler {
            name: config.name.clone(),
            message: e.to_string(),
        })?;
        self.name = config.name.clone();
        self.content_types = settings.content_types;
        self.patterns = patterns;
        Ok(())
    }
}

#[async_trait]
impl Filter for BlockFilter {
    fn interested(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
        Ok(!self.patterns.is_empty()
            && !headers.is_encoded()
            && content_type_matches(&self.content_types, headers))
    }

    async fn rewrite(
        &self,
        ctx: &mut RequestContext,
        headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError> {
        if headers.is_encoded() {
            tracing::warn!(
                request_id = %ctx.request_id(),
                filter = %self.name,
                "Body already encoded, patterns not checked"
            );
            return Ok(Rewrite::Rewritten(body));
        }
        let matched = self.patterns.matches(&body);
        if let Some(index) = matched.iter().next() {
            tracing::info!(
                request_id = %ctx.request_id(),
                filter = %self.name,
                pattern = %self.patterns.patterns()[index],
                "Response suppressed"
            );
            return Ok(Rewrite::Aborted);
        }
        Ok(Rewrite::Rewritten(body))
    }
}
