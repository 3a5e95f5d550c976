//! Gzip response compression.
//!
//! # Responsibilities
//! - Compress when the client accepts gzip and the body is not encoded yet
//! - Skip media types that are already compressed (images, archives, video)
//! - Set `Content-Encoding` and extend `Vary`
//!
//! # Design Decisions
//! - Meant to sit last in the chain so it sees every earlier rewrite
//! - The size threshold is re-checked on the final body, since earlier
//!   filters may have shrunk it

use std::io::Write;

use async_trait::async_trait;
use axum::http::header::{self, HeaderValue};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::filter::{Filter, Rewrite};
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;

const DEFAULT_MIN_LENGTH: usize = 860;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GzipSettings {
    level: u32,
    min_length: usize,
}

impl Default for GzipSettings {
    fn default() -> Self {
        Self {
            level: 6,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

#[derive(Debug)]
pub struct GzipFilter {
    name: String,
    level: Compression,
    min_length: usize,
}

impl Default for GzipFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            level: Compression::default(),
            min_length: DEFAULT_MIN_LENGTH,
        }
    }
}

impl GzipFilter {
    pub fn new(name: impl Into<String>, level: u32, min_length: usize) -> Self {
        Self {
            name: name.into(),
            level: Compression::new(level),
            min_length,
        }
    }
}

/// True when `Accept-Encoding` lists gzip (or `*`) with a non-zero q-value.
fn accepts_gzip(request: &HeaderSet) -> bool {
    request
        .get_all(header::ACCEPT_ENCODING.as_str())
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or_default().trim();
            if !(coding.eq_ignore_ascii_case("gzip") || coding == "*") {
                return false;
            }
            parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .all(|q| q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false))
        })
}

/// True when `Vary` already covers `Accept-Encoding` (or is `*`).
fn varies_on_encoding(headers: &HeaderSet) -> bool {
    headers
        .get_all(header::VARY.as_str())
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|field| field == "*" || field.eq_ignore_ascii_case("accept-encoding"))
}

fn compressible(headers: &HeaderSet) -> bool {
    let Some(media) = headers.content_type() else {
        return false;
    };
    if media == "image/svg+xml" {
        return true;
    }
    !(media.starts_with("image/")
        || media.starts_with("video/")
        || media.starts_with("audio/")
        || media == "application/zip"
        || media == "application/gzip"
        || media == "application/octet-stream")
}

#[async_trait]
impl Handler for GzipFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: GzipSettings = config.parse_settings()?;
        if settings.level > 9 {
            return Err(ConfigError::Handler {
                name: config.name.clone(),
                message: format!("level {} is out of range 0-9", settings.level),
            });
        }
        self.name = config.name.clone();
        self.level = Compression::new(settings.level);
        self.min_length = settings.min_length;
        Ok(())
    }
}

#[async_trait]
impl Filter for GzipFilter {
    fn interested(
        &self,
        ctx: &mut RequestContext,
        headers: &mut HeaderSet,
    ) -> Result<bool, HandlerError> {
        if !accepts_gzip(ctx.headers()) || headers.is_encoded() || !compressible(headers) {
            return Ok(false);
        }
        if headers.contains(header::CONTENT_RANGE.as_str()) {
            return Ok(false);
        }
        Ok(headers
            .content_length()
            .map_or(true, |len| len >= self.min_length as u64))
    }

    async fn rewrite(
        &self,
        _ctx: &mut RequestContext,
        headers: &mut HeaderSet,
        body: Bytes,
    ) -> Result<Rewrite, HandlerError> {
        if body.len() < self.min_length || headers.is_encoded() {
            return Ok(Rewrite::Rewritten(body));
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), self.level);
        encoder
            .write_all(&body)
            .map_err(|e| HandlerError::with_source("gzip encoding failed", e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| HandlerError::with_source("gzip encoding failed", e))?;

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.remove(header::ACCEPT_RANGES.as_str());
        if !varies_on_encoding(headers) {
            headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
        }
        Ok(Rewrite::Rewritten(Bytes::from(compressed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, Method, Uri};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn ctx(accept: &'static str) -> RequestContext {
        let headers: HeaderSet = [(header::ACCEPT_ENCODING, HeaderValue::from_static(accept))]
            .into_iter()
            .collect();
        RequestContext::new(Method::GET, Uri::from_static("/")).with_headers(headers)
    }

    fn typed(ct: &'static str) -> HeaderSet {
        let mut headers = HeaderSet::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        headers
    }

    #[test]
    fn test_accepts_gzip() {
        let h = |v: &'static str| -> HeaderSet {
            [(HeaderName::from_static("accept-encoding"), HeaderValue::from_static(v))]
                .into_iter()
                .collect()
        };
        assert!(accepts_gzip(&h("gzip, deflate")));
        assert!(accepts_gzip(&h("br;q=1.0, GZIP;q=0.5")));
        assert!(accepts_gzip(&h("*")));
        assert!(!accepts_gzip(&h("gzip;q=0")));
        assert!(!accepts_gzip(&h("br")));
        assert!(!accepts_gzip(&HeaderSet::new()));
    }

    #[test]
    fn test_interest() {
        let f = GzipFilter::new("gz", 6, 10);
        assert!(f.interested(&mut ctx("gzip"), &mut typed("text/html")).unwrap());
        assert!(!f.interested(&mut ctx("br"), &mut typed("text/html")).unwrap());
        assert!(!f.interested(&mut ctx("gzip"), &mut typed("image/png")).unwrap());

        let mut small = typed("text/html");
        small.set_content_length(3);
        assert!(!f.interested(&mut ctx("gzip"), &mut small).unwrap());
    }

    #[tokio::test]
    async fn test_compresses_and_sets_headers() {
        let f = GzipFilter::new("gz", 6, 10);
        let body = Bytes::from("hello hello hello hello hello");
        let mut headers = typed("text/plain");

        let out = f.rewrite(&mut ctx("gzip"), &mut headers, body.clone()).await.unwrap();
        let Rewrite::Rewritten(compressed) = out else {
            panic!("gzip never aborts");
        };

        let mut decoded = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded.as_bytes(), &body[..]);
        assert_eq!(headers.get_str("content-encoding"), Some("gzip"));
        assert_eq!(headers.get_str("vary"), Some("accept-encoding"));
    }

    #[tokio::test]
    async fn test_existing_vary_not_duplicated() {
        let f = GzipFilter::new("gz", 6, 1);
        let mut headers = typed("text/plain");
        headers.append(header::VARY, HeaderValue::from_static("Origin, Accept-Encoding"));

        f.rewrite(&mut ctx("gzip"), &mut headers, Bytes::from("hello hello"))
            .await
            .unwrap();
        assert_eq!(headers.get_all("vary").count(), 1);
        assert_eq!(headers.get_str("content-encoding"), Some("gzip"));

        let mut headers = typed("text/plain");
        headers.append(header::VARY, HeaderValue::from_static("origin"));
        f.rewrite(&mut ctx("gzip"), &mut headers, Bytes::from("hello hello"))
            .await
            .unwrap();
        let vary: Vec<_> = headers.get_all("vary").filter_map(|v| v.to_str().ok()).collect();
        assert_eq!(vary, vec!["origin", "accept-encoding"]);
    }

    #[tokio::test]
    async fn test_small_body_left_alone() {
        let f = GzipFilter::new("gz", 6, 100);
        let mut headers = typed("text/plain");
        let out = f
            .rewrite(&mut ctx("gzip"), &mut headers, Bytes::from_static(b"tiny"))
            .await
            .unwrap();
        assert_eq!(out, Rewrite::Rewritten(Bytes::from_static(b"tiny")));
        assert!(!headers.contains("content-encoding"));
    }
}
