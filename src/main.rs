//! canopy: server runtime for nested-route web applications.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                        CANOPY                          │
//!                        │                                                        │
//!   Client Request       │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐ │
//!   ─────────────────────┼─▶│  http  │──▶│ handler  │──▶│ routing │──▶│executor │ │
//!                        │  │ server │   │ classify │   │ matches │   │ loaders │ │
//!                        │  └────────┘   └──────────┘   └─────────┘   └────┬────┘ │
//!                        │                                                 │      │
//!                        │                                                 ▼      │
//!   Client Response      │  ┌────────┐   ┌──────────┐               ┌──────────┐  │
//!   ◀────────────────────┼──│ codec  │◀──│aggregate │◀──────────────│ outcomes │  │
//!                        │  │/render │   │ status + │               └──────────┘  │
//!                        │  └────────┘   │ headers  │                             │
//!                        │               └──────────┘                             │
//!                        │  ┌──────────────────────────────────────────────────┐  │
//!                        │  │ config (hot reload) · observability · lifecycle  │  │
//!                        │  └──────────────────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────────────┘
//! ```
//!
//! The binary serves the built-in demo application. Embedders construct
//! their own [`ServerBuild`] and hand it to [`HttpServer`].

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use canopy::build::{BuildSource, ServerBuild};
use canopy::config::{load_config, ConfigWatcher, ServerConfig};
use canopy::lifecycle::signals::shutdown_signal;
use canopy::observability::{logging, metrics};
use canopy::{demo, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Serve the canopy demo application", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "canopy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = config.mode.as_str(),
        single_fetch = config.future.v3_single_fetch,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the life of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    let source = BuildSource::from(ServerBuild::configured(demo::build(), &config));
    HttpServer::new(config, source)
        .run(listener, config_updates, shutdown_rx)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
