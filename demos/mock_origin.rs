//! A small origin to put behind the proxy while trying out filters.
//!
//! ```text
//! cargo run --example mock_origin
//! cargo run -- --config filter-proxy.toml
//! curl -H 'accept-encoding: gzip' --compressed http://127.0.0.1:8080/
//! ```

use axum::{response::Html, routing::get, Router};
use std::net::SocketAddr;

const PAGE: &str = r#"<!doctype html>
<html>
<head><title>Origin</title></head>
<body>
<h1>Hello from the origin</h1>
<p>Links point at <a href="http://origin.internal/docs">origin.internal</a>.</p>
<p>Internal build token: BUILD-1234</p>
</body>
</html>
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/", get(|| async { Html(PAGE) }))
        .route("/plain", get(|| async { "plain text from the origin\n" }))
        .route("/status", get(|| async { "Origin is healthy\n" }));

    let addr = SocketAddr::from(([127, 0, 0, 1], 8081));
    println!("Mock origin listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
