//! Terminal filter: answers matching paths itself, before the producer is
//! contacted.

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;
use crate::http::response::Emitted;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DenySettings {
    path_prefixes: Vec<String>,
    status: u16,
    message: String,
}

impl Default for DenySettings {
    fn default() -> Self {
        Self {
            path_prefixes: Vec::new(),
            status: 403,
            message: "Forbidden".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct DenyFilter {
    name: String,
    path_prefixes: Vec<String>,
    status: StatusCode,
    message: String,
}

impl Default for DenyFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            path_prefixes: Vec::new(),
            status: StatusCode::FORBIDDEN,
            message: DenySettings::default().message,
        }
    }
}

impl DenyFilter {
    pub fn new(name: impl Into<String>, path_prefixes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            path_prefixes,
            ..Self::default()
        }
    }

    fn denies(&self, path: &str) -> bool {
        self.path_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[async_trait]
impl Handler for DenyFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: DenySettings = config.parse_settings()?;
        let status = StatusCode::from_u16(settings.status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .ok_or_else(|| ConfigError::Handler {
                name: config.name.clone(),
                message: format!("status {} is not a 4xx/5xx code", settings.status),
            })?;
        self.name = config.name.clone();
        self.path_prefixes = settings.path_prefixes;
        self.status = status;
        self.message = settings.message;
        Ok(())
    }

    async fn try_handle(&self, ctx: &mut RequestContext) -> Result<Option<Emitted>, HandlerError> {
        if !self.denies(ctx.path()) {
            return Ok(None);
        }
        tracing::debug!(
            request_id = %ctx.request_id(),
            filter = %self.name,
            path = %ctx.path(),
            status = %self.status,
            "Request answered by filter"
        );
        Ok(Some(Emitted::text(self.status, self.message.clone())))
    }
}

#[async_trait]
impl Filter for DenyFilter {
    fn interested(
        &self,
        _ctx: &mut RequestContext,
        _headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
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
