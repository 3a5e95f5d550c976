//! Producer serving files from a document root.
//!
//! # Responsibilities
//! - Map the request path onto a file under `root` (index file for directories)
//! - Refuse paths escaping the root
//! - Stream files on the fast path, read them fully (bounded) when filtered

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::config::ConfigError;
use crate::handler::{Handler, HandlerConfig, HandlerError};
use crate::http::headers::HeaderSet;
use crate::http::request::RequestContext;
use crate::http::response::Emitted;
use crate::producer::{ContentProducer, ResponseHead};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FilesSettings {
    root: PathBuf,
    index: String,
    max_body_bytes: usize,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index: "index.html".to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// File resolved by `produce_headers`, kept for the body call.
#[derive(Debug)]
struct Resolved(Option<PathBuf>);

#[derive(Debug)]
pub struct FileProducer {
    name: String,
    root: PathBuf,
    index: String,
    max_body_bytes: usize,
}

impl Default for FileProducer {
    fn default() -> Self {
        let settings = FilesSettings::default();
        Self {
            name: String::new(),
            root: settings.root,
            index: settings.index,
            max_body_bytes: settings.max_body_bytes,
        }
    }
}

impl FileProducer {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ..Self::default()
        }
    }

    /// Join the request path onto the root; `None` when it tries to escape.
    fn candidate(&self, request_path: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(request_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    async fn resolve(&self, request_path: &str) -> Option<(PathBuf, u64)> {
        let mut path = self.candidate(request_path)?;
        let mut meta = tokio::fs::metadata(&path).await.ok()?;
        if meta.is_dir() {
            path.push(&self.index);
            meta = tokio::fs::metadata(&path).await.ok()?;
        }
        meta.is_file().then_some((path, meta.len()))
    }

    fn take_resolved(&self, ctx: &mut RequestContext) -> Result<Option<PathBuf>, HandlerError> {
        ctx.attributes
            .remove::<Resolved>(&self.name)
            .map(|r| r.0)
            .ok_or_else(|| HandlerError::new("body requested before headers"))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "gz" => "application/gzip",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Handler for FileProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, config: &HandlerConfig) -> Result<(), ConfigError> {
        let settings: FilesSettings = config.parse_settings()?;
        if !settings.root.is_dir() {
            return Err(ConfigError::Handler {
                name: config.name.clone(),
                message: format!("root {:?} is not a directory", settings.root),
            });
        }
        self.name = config.name.clone();
        self.root = settings.root;
        self.index = settings.index;
        self.max_body_bytes = settings.max_body_bytes;
        Ok(())
    }

    async fn try_handle(&self, ctx: &mut RequestContext) -> Result<Option<Emitted>, HandlerError> {
        if ctx.method() == Method::GET || ctx.method() == Method::HEAD {
            return Ok(None);
        }
        let mut headers = HeaderSet::new();
        headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        Ok(Some(Emitted::empty(StatusCode::METHOD_NOT_ALLOWED, headers)))
    }
}

#[async_trait]
impl ContentProducer for FileProducer {
    async fn produce_headers(&self, ctx: &mut RequestContext) -> Result<ResponseHead, HandlerError> {
        let mut headers = HeaderSet::new();
        let resolved = self.resolve(ctx.path()).await;

        let status = match &resolved {
            Some((path, len)) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type_for(path)),
                );
                headers.set_content_length(*len);
                StatusCode::OK
            }
            None => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    "File not found"
                );
                headers.set_content_length(0);
                StatusCode::NOT_FOUND
            }
        };

        ctx.attributes
            .insert(&self.name, Resolved(resolved.map(|(path, _)| path)));
        Ok(ResponseHead::new(status, headers))
    }

    async fn produce_body(&self, ctx: &mut RequestContext) -> Result<Bytes, HandlerError> {
        let Some(path) = self.take_resolved(ctx)? else {
            return Ok(Bytes::new());
        };
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| HandlerError::with_source(format!("stat {path:?} failed"), e))?;
        if meta.len() > self.max_body_bytes as u64 {
            return Err(HandlerError::new(format!(
                "file of {} bytes exceeds limit of {}",
                meta.len(),
                self.max_body_bytes
            )));
        }
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| HandlerError::with_source(format!("read {path:?} failed"), e))?;
        Ok(Bytes::from(data))
    }

    async fn stream_body(&self, ctx: &mut RequestContext) -> Result<Body, HandlerError> {
        let Some(path) = self.take_resolved(ctx)? else {
            return Ok(Body::empty());
        };
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| HandlerError::with_source(format!("open {path:?} failed"), e))?;
        Ok(Body::from_stream(ReaderStream::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    fn ctx(path: &str) -> RequestContext {
        RequestContext::new(Method::GET, path.parse::<Uri>().unwrap())
    }

    #[tokio::test]
    async fn test_serves_file_and_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("data.json"), "{}").unwrap();
        let producer = FileProducer::new("files", dir.path());

        let mut c = ctx("/");
        let head = producer.produce_headers(&mut c).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers.content_type().as_deref(), Some("text/html"));
        assert_eq!(&producer.produce_body(&mut c).await.unwrap()[..], b"<h1>home</h1>");

        let mut c = ctx("/data.json");
        let head = producer.produce_headers(&mut c).await.unwrap();
        assert_eq!(head.headers.content_length(), Some(2));
        let body = producer.stream_body(&mut c).await.unwrap();
        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(&bytes[..], b"{}");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let producer = FileProducer::new("files", dir.path());

        let mut c = ctx("/nope.txt");
        let head = producer.produce_headers(&mut c).await.unwrap();
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert!(producer.produce_body(&mut c).await.unwrap().is_empty());

        assert!(producer.candidate("/../etc/passwd").is_none());
    }

    #[tokio::test]
    async fn test_body_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), vec![b'x'; 64]).unwrap();
        let mut producer = FileProducer::new("files", dir.path());
        producer.max_body_bytes = 16;

        let mut c = ctx("/big.txt");
        producer.produce_headers(&mut c).await.unwrap();
        assert!(producer.produce_body(&mut c).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_other_methods() {
        let dir = tempfile::tempdir().unwrap();
        let producer = FileProducer::new("files", dir.path());
        let mut c = RequestContext::new(Method::POST, Uri::from_static("/"));
        let answer = producer.try_handle(&mut c).await.unwrap().unwrap();
        assert_eq!(answer.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
