//! Admission gate (v1)
//!
//! Serves a small demo application behind adaptive admission control.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    ADMISSION GATE                    │
//!                 │                                                      │
//!  Client ───────▶│  error header ─▶ rate limiter ─▶ load shedder ─▶ app │
//!                 │  (log, strip)    (per client)    (per route)         │
//!  ◀── 429 / 503 ─│                                                      │
//!                 │                                                      │
//!                 │  admin API (/admin/*)     metrics (Prometheus)       │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admission_gate::admin::setup_admin_router;
use admission_gate::config::{load_config, GuardConfig};
use admission_gate::http::{GuardServer, ServerError};
use admission_gate::lifecycle::{shutdown_signal, Shutdown};
use admission_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "admission-gate")]
#[command(about = "Demo server behind per-client rate limiting and p99 load shedding", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("admission-gate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit = config.rate_limit.enabled,
        send_rate = config.rate_limit.send_rate,
        load_shed = config.load_shed.enabled,
        breach_latency_ms = config.load_shed.breach_latency_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let server = GuardServer::new(config.clone()).map_err(ServerError::from)?;
    let shutdown = Shutdown::new();

    if config.admin.enabled {
        let admin = setup_admin_router(server.stack().clone(), &config.admin.api_key);
        let listener = bind(&config.admin.bind_address).await?;
        let stop = shutdown.wait();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, admin).with_graceful_shutdown(stop).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = bind(&config.listener.bind_address).await?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown.wait()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}
