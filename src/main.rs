//! Dataset archive server.
//!
//! # Architecture Overview
//!
//! ```text
//!   -C config files, dataset dirs, remote servers
//!        │
//!        ▼
//!   ┌──────────────┐      ┌────────────────────────────────────────────┐
//!   │   datasets   │─────▶│                   http                     │
//!   │ merge/filter │      │ server → views → dispatch → response latch │
//!   └──────────────┘      └──────────────────────┬─────────────────────┘
//!                                                │ blocking pool
//!                                                ▼
//!                                        ┌──────────────┐
//!                                        │    engine    │ arki-query / arki-dump
//!                                        └──────────────┘
//!
//!   Cross-cutting: config (settings), observability, lifecycle
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use arki_server::config::{load_config, ServerConfig};
use arki_server::datasets::{pipeline, MergeOptions, SourceLoader};
use arki_server::lifecycle::{spawn_signal_handler, Shutdown};
use arki_server::observability::logging::{self, LogTarget};
use arki_server::observability::metrics;
use arki_server::{ExecEngine, HttpServer, ServerState};

/// Serve datasets over HTTP.
#[derive(Parser)]
#[command(name = "arki-server", version, about)]
struct Cli {
    /// Server settings (TOML)
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Address to listen on, as host:port
    #[arg(long, value_name = "ADDR", conflicts_with_all = ["host", "port"])]
    bind: Option<String>,

    /// Host name or address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Public URL of the server, used in dataset configurations
    #[arg(long)]
    url: Option<String>,

    /// Serve only datasets that allow one of the given (comma separated)
    /// names
    #[arg(long, value_name = "NAMES")]
    restrict: Option<String>,

    /// Dataset configuration file (can be given more than once)
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    config: Vec<String>,

    /// Datasets, configuration files or remote urls
    sources: Vec<String>,
}

impl Cli {
    /// Bind address after command line overrides.
    fn bind_address(&self, settings: &ServerConfig) -> String {
        if let Some(bind) = &self.bind {
            return bind.clone();
        }
        let configured = &settings.listener.bind_address;
        let (host, port) = configured.rsplit_once(':').unwrap_or((configured.as_str(), "8080"));
        let host = self.host.as_deref().unwrap_or(host);
        let port = self.port.map(|p| p.to_string()).unwrap_or_else(|| port.to_string());
        format!("{}:{}", host, port)
    }
}

fn public_url(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Server failed");
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => load_config(path).with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    logging::init(&settings.observability.log_level, LogTarget::Stdout);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "arki-server starting");

    if settings.observability.metrics_enabled {
        let addr = settings
            .observability
            .metrics_address
            .parse()
            .with_context(|| format!("invalid metrics address {}", settings.observability.metrics_address))?;
        metrics::init_metrics(addr);
    }

    let opts = MergeOptions {
        configs: cli.config.clone(),
        sources: cli.sources.clone(),
        restrict: cli.restrict.clone(),
        ..Default::default()
    };
    let cfg = pipeline::load(&opts, &SourceLoader::new()).await?;
    tracing::info!(datasets = cfg.len(), "Configuration loaded");

    let bind_address = cli.bind_address(&settings);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("cannot listen on {}", bind_address))?;
    let local_addr = listener.local_addr()?;

    let url = cli
        .url
        .clone()
        .or_else(|| settings.server.url.clone())
        .unwrap_or_else(|| public_url(local_addr));
    tracing::info!(address = %local_addr, url = %url, "Listening for connections");

    let engine = Arc::new(ExecEngine::new(&settings.engine));
    let state = ServerState::new(cfg, &url, engine)
        .with_staging_root(settings.staging.root.as_ref().map(PathBuf::from));

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    HttpServer::new(&settings, state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
