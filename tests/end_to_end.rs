//! End-to-end tests: real listener, mock origin, reqwest client.

use std::io::Read;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::OriginReply;

mod common;

fn upstream(origin: std::net::SocketAddr) -> String {
    format!(
        r#"
        [producer]
        name = "origin"
        kind = "upstream"
        [producer.settings]
        origin = "{origin}"
        [producer.settings.retries]
        base_delay_ms = 5
        max_delay_ms = 20
        "#
    )
}

#[tokio::test]
async fn test_rewrites_origin_html() {
    let origin = common::start_mock_origin(OriginReply::ok(
        "text/html; charset=utf-8",
        "<html><body><a href=\"http://old.example\">link</a></body></html>",
    ))
    .await;

    let proxy = common::start_proxy(&format!(
        r#"{}
        [[filters]]
        name = "links"
        kind = "replace"
        [filters.settings]
        replacements = [{{ from = "old.example", to = "new.example" }}]

        [[filters]]
        name = "footer"
        kind = "append"
        [filters.settings]
        text = "<footer>proxied</footer>"
        "#,
        upstream(origin)
    ))
    .await;

    let res = common::client().get(proxy.url("/page")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    let declared: usize = res.headers()["content-length"].to_str().unwrap().parse().unwrap();
    let body = res.text().await.unwrap();

    assert_eq!(
        body,
        "<html><body><a href=\"http://new.example\">link</a><footer>proxied</footer></body></html>"
    );
    assert_eq!(declared, body.len());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_uninterested_content_passes_through() {
    let origin = common::start_mock_origin(OriginReply::ok("image/png", "\u{1}PNGDATA")).await;
    let proxy = common::start_proxy(&format!(
        r#"{}
        [[filters]]
        name = "links"
        kind = "replace"
        [filters.settings]
        replacements = [{{ from = "PNG", to = "GIF" }}]
        "#,
        upstream(origin)
    ))
    .await;

    let res = common::client().get(proxy.url("/logo.png")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert_eq!(res.headers()["content-length"], "8");
    assert_eq!(res.bytes().await.unwrap().as_ref(), b"\x01PNGDATA");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_block_aborts_with_empty_body() {
    let origin =
        common::start_mock_origin(OriginReply::ok("text/plain", "the password is hunter2")).await;
    let proxy = common::start_proxy(&format!(
        r#"{}
        [[filters]]
        name = "secrets"
        kind = "block"
        [filters.settings]
        patterns = ["hunter\\d"]

        [[filters]]
        name = "after"
        kind = "append"
        [filters.settings]
        content_types = []
        text = "never"
        "#,
        upstream(origin)
    ))
    .await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-length"], "0");
    assert!(res.bytes().await.unwrap().is_empty());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_deny_answers_without_contacting_origin() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let origin = common::start_programmable_origin(move |_| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            OriginReply::ok("text/plain", "origin")
        }
    })
    .await;

    let proxy = common::start_proxy(&format!(
        r#"{}
        [[filters]]
        name = "private"
        kind = "deny"
        [filters.settings]
        path_prefixes = ["/admin"]
        status = 404
        message = "Not Found"
        "#,
        upstream(origin)
    ))
    .await;

    let client = common::client();
    let res = client.get(proxy.url("/admin/users")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "Not Found");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let res = client.get(proxy.url("/public")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "origin");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let origin = common::closed_port().await;
    let proxy = common::start_proxy(&upstream(origin)).await;

    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "Bad Gateway");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_retries_until_origin_recovers() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let origin = common::start_programmable_origin(move |_| {
        let seen = seen.clone();
        async move {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                OriginReply {
                    status: 503,
                    content_type: "text/plain",
                    body: "busy".to_string(),
                }
            } else {
                OriginReply::ok("text/plain", "Success")
            }
        }
    })
    .await;

    let proxy = common::start_proxy(&upstream(origin)).await;
    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200, "should eventually succeed after retries");
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_forwards_request_identity_to_origin() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let origin = common::start_programmable_origin(move |head| {
        let _ = tx.send(head);
        async { OriginReply::ok("text/plain", "ok") }
    })
    .await;

    let proxy = common::start_proxy(&upstream(origin)).await;
    let res = common::client()
        .get(proxy.url("/search?q=rust"))
        .header("x-request-id", "trace-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-42");

    let head = rx.recv().await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /search?q=rust http/1.1"), "{head}");
    assert!(head.contains("x-request-id: trace-42"));
    assert!(head.contains("x-forwarded-for: 127.0.0.1"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_gzip_compresses_filtered_body() {
    let text = "lorem ipsum dolor sit amet ".repeat(100);
    let origin = common::start_mock_origin(OriginReply::ok("text/plain", text.clone())).await;
    let proxy = common::start_proxy(&format!(
        r#"{}
        [[filters]]
        name = "shout"
        kind = "replace"
        [filters.settings]
        replacements = [{{ from = "lorem", to = "LOREM" }}]

        [[filters]]
        name = "compress"
        kind = "gzip"
        "#,
        upstream(origin)
    ))
    .await;

    let res = common::client()
        .get(proxy.url("/"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["content-encoding"], "gzip");
    assert_eq!(res.headers()["vary"], "accept-encoding");
    let declared: usize = res.headers()["content-length"].to_str().unwrap().parse().unwrap();
    let compressed = res.bytes().await.unwrap();
    assert_eq!(declared, compressed.len());
    assert!(compressed.len() < text.len());

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(&compressed[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, text.replace("lorem", "LOREM"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_serves_files_with_header_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<body>home</body>").unwrap();

    let proxy = common::start_proxy(&format!(
        r#"
        [producer]
        name = "site"
        kind = "files"
        [producer.settings]
        root = "{}"

        [[filters]]
        name = "headers"
        kind = "set-header"
        [filters.settings]
        set = {{ "cache-control" = "no-store" }}
        "#,
        dir.path().display()
    ))
    .await;

    let client = common::client();
    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.text().await.unwrap(), "<body>home</body>");

    let res = client.get(proxy.url("/missing.css")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let proxy = common::start_proxy("").await;
    let res = common::client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    proxy.shutdown.trigger();
    let stopped = tokio::time::timeout(Duration::from_secs(5), proxy.task).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}
