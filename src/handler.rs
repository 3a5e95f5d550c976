//! Capability shared by filters and content producers.
//!
//! Both roles are configured the same way (a name, a kind and a settings
//! table), are initialized once at startup, and may answer a request
//! themselves before any content is fetched.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::http::request::RequestContext;
use crate::http::response::Emitted;

/// Boxed error source carried by handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure raised by a filter or producer while processing a request.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error with context.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Configuration entry for one filter or producer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    /// Unique name; also the owner key for request attributes.
    pub name: String,

    /// Registered kind, e.g. "replace" or "upstream".
    pub kind: String,

    /// Kind-specific settings.
    #[serde(default)]
    pub settings: toml::Table,
}

impl HandlerConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            settings: toml::Table::new(),
        }
    }

    pub fn with_settings(mut self, settings: toml::Table) -> Self {
        self.settings = settings;
        self
    }

    /// Deserialize the settings table into a typed struct.
    pub fn parse_settings<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.settings.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Handler {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

/// Lifecycle hooks common to filters and producers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Configured name, used in logs and as the attribute owner key.
    fn name(&self) -> &str;

    /// Called once at startup, before the first request.
    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError>;

    /// Answer the request without involving the rest of the pipeline.
    ///
    /// Returning `Some` completes the request.
    async fn try_handle(&self, _ctx: &mut RequestContext) -> Result<Option<Emitted>, HandlerError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        level: u32,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[test]
    fn test_parse_settings() {
        let settings: toml::Table = toml::from_str("level = 3\ntags = [\"a\"]").unwrap();
        let config = HandlerConfig::new("f", "k").with_settings(settings);
        let parsed: Sample = config.parse_settings().unwrap();
        assert_eq!(parsed.level, 3);
        assert_eq!(parsed.tags, vec!["a"]);
    }

    #[test]
    fn test_parse_settings_reports_handler_name() {
        let settings: toml::Table = toml::from_str("level = \"high\"").unwrap();
        let config = HandlerConfig::new("broken", "k").with_settings(settings);
        let err = config.parse_settings::<Sample>().unwrap_err();
        assert!(matches!(err, ConfigError::Handler { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_handler_config_from_toml() {
        let config: HandlerConfig = toml::from_str(
            "name = \"x\"\nkind = \"replace\"\n[settings]\ncontent_types = [\"text/\"]",
        )
        .unwrap();
        assert_eq!(config.kind, "replace");
        assert!(config.settings.contains_key("content_types"));
    }
}
