//! Filtering reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     FILTER PROXY                      │
//!   Client Request     │  ┌─────────┐   ┌──────────────┐   ┌───────────────┐  │
//!   ───────────────────┼─▶│  http   │──▶│   pipeline   │──▶│   producer    │──┼──▶ Origin /
//!                      │  │ server  │   │ orchestrator │   │ upstream,     │  │    files /
//!                      │  └─────────┘   └──────┬───────┘   │ static, files │  │    static
//!                      │                       │           └───────────────┘  │
//!                      │                       ▼                              │
//!   Client Response    │                ┌──────────────┐                      │
//!   ◀──────────────────┼────────────────│ filter chain │                      │
//!                      │                │ replace, ... │                      │
//!                      │                └──────────────┘                      │
//!                      │  ┌────────────────────────────────────────────────┐  │
//!                      │  │ config · observability · resilience · lifecycle │  │
//!                      │  └────────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use filter_proxy::config::{load_config, ProxyConfig};
use filter_proxy::lifecycle::{signals, Shutdown};
use filter_proxy::observability::{logging, metrics};
use filter_proxy::{HttpServer, Registry};

#[derive(Parser, Debug)]
#[command(name = "filter-proxy", version, about = "HTTP server that rewrites responses through a filter chain")]
struct Args {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Build the pipeline from the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind.to_string();
    }

    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "filter-proxy starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        producer = %config.producer.0.kind,
        filters = config.filters.len(),
        "Configuration loaded"
    );

    let bind_address = config.listener.bind_address.clone();
    let metrics_address = config
        .observability
        .metrics_enabled
        .then(|| config.observability.metrics_address.clone());

    let server = HttpServer::from_config(config, &Registry::builtin())?;
    if args.check {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    if let Some(addr) = metrics_address {
        metrics::init_metrics(addr.parse()?)?;
    }

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
