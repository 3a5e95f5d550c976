//! Producer answering every request with the same configured content.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use bytes::Bytes;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;
use crate::producer::{ContentProducer, ResponseHead};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StaticSettings {
    status: u16,
    content_type: String,
    body: String,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct StaticProducer {
    name: String,
    status: StatusCode,
    content_type: HeaderValue,
    body: Bytes,
}

impl Default for StaticProducer {
    fn default() -> Self {
        Self {
            name: String::new(),
            status: StatusCode::OK,
            content_type: HeaderValue::from_static("text/plain; charset=utf-8"),
            body: Bytes::new(),
        }
    }
}

impl StaticProducer {
    pub fn new(name: impl Into<String>, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            status: StatusCode::OK,
            content_type: HeaderValue::from_static(content_type),
            body: body.into(),
        }
    }
}

#[async_trait]
impl Handler for StaticProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: StaticSettings = config.parse_settings()?;
        let invalid = |message: String| ConfigError::Handler {
            name: config.name.clone(),
            message,
        };
        self.status = StatusCode::from_u16(settings.status)
            .map_err(|e| invalid(format!("invalid status {}: {e}", settings.status)))?;
        self.content_type = HeaderValue::try_from(settings.content_type.as_str())
            .map_err(|e| invalid(format!("invalid content_type: {e}")))?;
        self.name = config.name.clone();
        self.body = Bytes::from(settings.body);
        Ok(())
    }
}

#[async_trait]
impl ContentProducer for StaticProducer {
    async fn produce_headers(&self, _ctx: &mut RequestContext) -> Result<ResponseHead, HandlerError> {
        let mut headers = HeaderSet::new();
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        headers.set_content_length(self.body.len() as u64);
        Ok(ResponseHead::new(self.status, headers))
    }

    async fn produce_body(&self, _ctx: &mut RequestContext) -> Result<Bytes, HandlerError> {
        Ok(self.body.clone())
    }

    async fn stream_body(&self, _ctx: &mut RequestContext) -> Result<Body, HandlerError> {
        Ok(Body::from(self.body.clone()))
    }
}
