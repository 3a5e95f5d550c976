//! Header-only filter: edits response headers during the interest test and
//! never asks for the body.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::header::{HeaderName, HeaderValue};
use bytes::Bytes;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetHeaderSettings {
    set: BTreeMap<String, String>,
    remove: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SetHeaderFilter {
    name: String,
    set: Vec<(HeaderName, HeaderValue)>,
    remove: Vec<HeaderName>,
}

impl SetHeaderFilter {
    pub fn new(
        name: impl Into<String>,
        set: Vec<(HeaderName, HeaderValue)>,
        remove: Vec<HeaderName>,
    ) -> Self {
        Self {
            name: name.into(),
            set,
            remove,
        }
    }
}

#[async_trait]
impl Handler for SetHeaderFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: SetHeaderSettings = config.parse_settings()?;
        let invalid = |message: String| ConfigError::Handler {
            name: config.name.clone(),
            message,
        };

        let mut set = Vec::with_capacity(settings.set.len());
        for (k, v) in settings.set {
            let name = HeaderName::try_from(k.as_str())
                .map_err(|e| invalid(format!("invalid header name {k:?}: {e}")))?;
            let value = HeaderValue::try_from(v.as_str())
                .map_err(|e| invalid(format!("invalid value for {k}: {e}")))?;
            set.push((name, value));
        }

        let mut remove = Vec::with_capacity(settings.remove.len());
        for k in settings.remove {
            remove.push(
                HeaderName::try_from(k.as_str())
                    .map_err(|e| invalid(format!("invalid header name {k:?}: {e}")))?,
            );
        }

        self.name = config.name.clone();
        self.set = set;
        self.remove = remove;
        Ok(())
    }
}

#[async_trait]
impl Filter for SetHeaderFilter {
    fn interested(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
        for name in &self.remove {
            headers.remove(name.as_str());
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
        Ok(false)
    }

    async fn rewrite(
        &self,
        _ctx: &mut RequestContext,
        _headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError> {
        Ok(Rewrite::Rewritten(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri};

    #[test]
    fn test_edits_headers_and_declines() {
        let settings: toml::Table = toml::from_str(
            "remove = [\"Server\"]\n[set]\n\"Content-Type\" = \"text/plain\"\n\"X-Frame-Options\" = \"DENY\"",
        )
        .unwrap();
        let mut f = SetHeaderFilter::default();
        f.initialize(&HandlerConfig::new("h", "set-header").with_settings(settings))
            .unwrap();

        let mut headers = HeaderSet::new();
        headers.insert(HeaderName::from_static("server"), HeaderValue::from_static("x"));
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/html"),
        );

        let mut ctx = RequestContext::new(Method::GET, Uri::from_static("/"));
        assert!(!f.interested(&mut ctx, &mut headers).unwrap());
        assert!(!headers.contains("server"));
        assert_eq!(headers.get_str("content-type"), Some("text/plain"));
        assert_eq!(headers.get_str("x-frame-options"), Some("DENY"));
    }

    #[test]
    fn test_initialize_rejects_bad_name() {
        let settings: toml::Table = toml::from_str("[set]\n\"bad name\" = \"v\"").unwrap();
        let mut f = SetHeaderFilter::default();
        assert!(f
            .initialize(&HandlerConfig::new("h", "set-header").with_settings(settings))
            .is_err());
    }
}
