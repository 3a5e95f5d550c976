//! Injects a snippet before `</body>`, or at the end when there is none.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{content_type_matches, Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

const BODY_CLOSE: &[u8] = b"</body>";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AppendSettings {
    content_types: Vec<String>,
    text: String,
}

impl Default for AppendSettings {
    fn default() -> Self {
        Self {
            content_types: vec!["text/html".to_string()],
            text: String::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AppendFilter {
    name: String,
    content_types: Vec<String>,
    text: Bytes,
}

impl AppendFilter {
    /// Appends `text` to responses of any content type.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_types: Vec::new(),
            text: Bytes::from(text.into()),
        }
    }
}

/// Offset of the last `</body>`, ignoring ASCII case.
fn find_body_close(body: &[u8]) -> Option<usize> {
    if body.len() < BODY_CLOSE.len() {
        return None;
    }
    (0..=body.len() - BODY_CLOSE.len())
        .rev()
        .find(|&i| body[i..i + BODY_CLOSE.len()].eq_ignore_ascii_case(BODY_CLOSE))
}

#[async_trait]
impl Handler for AppendFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: AppendSettings = config.parse_settings()?;
        if settings.text.is_empty() {
            return Err(ConfigError::Handler {
                name: config.name.clone(),
                message: "`text` is required".to_string(),
            });
        }
        self.name = config.name.clone();
        self.content_types = settings.content_types;
        self.text = Bytes::from(settings.text);
        Ok(())
    }
}

#[async_trait]
impl Filter for AppendFilter {
    fn interested(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
        Ok(!headers.is_encoded() && content_type_matches(&self.content_types, headers))
    }

    async fn rewrite(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError> {
        if headers.is_encoded() {
            return Ok(Rewrite::Rewritten(body));
        }
        let mut out = BytesMut::with_capacity(body.len() + self.text.len());
        match find_body_close(&body) {
            Some(at) => {
                out.extend_from_slice(&body[..at]);
                out.extend_from_slice(&self.text);
                out.extend_from_slice(&body[at..]);
            }
            None => {
                out.extend_from_slice(&body);
                out.extend_from_slice(&self.text);
            }
        }
        Ok(Rewrite::Rewritten(out.freeze()))
    }
}
