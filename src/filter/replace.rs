//! Literal text substitution.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{content_type_matches, Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ReplaceSettings {
    content_types: Vec<String>,
    replacements: Vec<Replacement>,
}

impl Default for ReplaceSettings {
    fn default() -> Self {
        Self {
            content_types: vec!["text/".to_string()],
            replacements: Vec::new(),
        }
    }
}

/// Applies `from → to` substitutions, in listed order, to textual bodies.
#[derive(Debug, Default)]
pub struct ReplaceFilter {
    name: String,
    content_types: Vec<String>,
    replacements: Vec<Replacement>,
}

impl ReplaceFilter {
    pub fn new(name: impl Into<String>, replacements: Vec<Replacement>) -> Self {
        Self {
            name: name.into(),
            content_types: ReplaceSettings::default().content_types,
            replacements,
        }
    }
}

#[async_trait]
impl Handler for ReplaceFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: ReplaceSettings = config.parse_settings()?;
        if settings.replacements.iter().any(|r| r.from.is_empty()) {
            return Err(ConfigError::Handler {
                name: config.name.clone(),
                message: "replacement `from` must not be empty".to_string(),
            });
        }
        self.name = config.name.clone();
        self.content_types = settings.content_types;
        self.replacements = settings.replacements;
        Ok(())
    }
}

#[async_trait]
impl Filter for ReplaceFilter {
    fn interested(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
        Ok(!self.replacements.is_empty()
            && !headers.is_encoded()
            && content_type_matches(&self.content_types, headers))
    }

    async fn rewrite(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError> {
        // An earlier stage may have compressed the body since the interest pass.
        if headers.is_encoded() {
            return Ok(Rewrite::Rewritten(body));
        }
        let text = match std::str::from_utf8(&body) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!(filter = %self.name, "Body is not UTF-8, left unchanged");
                return Ok(Rewrite::Rewritten(body));
            }
        };

        if !self.replacements.iter().any(|r| text.contains(&r.from)) {
            return Ok(Rewrite::Rewritten(body));
        }

        let mut out = text.to_string();
        for r in &self.replacements {
            out = out.replace(&r.from, &r.to);
        }
        Ok(Rewrite::Rewritten(Bytes::from(out)))
    }
}
