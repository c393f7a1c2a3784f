//! study-gateway
//!
//! Gates every request to the document assistant before a handler sees it.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing ──▶ http::pipeline
//!                                                      │
//!                         ┌────────────────────────────┤
//!                         ▼                            ▼
//!                  cache (CacheGate)      security (RateLimiter, OriginGate)
//!                         │                            │
//!                         ▼                            ▼
//!                  auth (SessionAuthority) ──▶ http::handlers / Downstream
//!                         │
//!                         ▼
//!                  store (users, cache entries, counters)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use study_gateway::config::load_config;
use study_gateway::http::HttpServer;
use study_gateway::lifecycle::{open_stores, wait_for_signal, Shutdown};
use study_gateway::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "study-gateway")]
#[command(about = "Session, cache, rate-limit and origin gates for the document assistant", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config.observability)?;
    tracing::info!("study-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        cache_enabled = config.cache.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let opened = open_stores(&config)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, opened.stores.clone())?;

    let shutdown = Shutdown::new();
    let serving = server.run(listener, shutdown.clone());
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => result?,
        _ = wait_for_signal() => {
            shutdown.trigger();
            serving.await?;
        }
    }

    opened.save()?;
    tracing::info!("Shutdown complete");
    Ok(())
}
