//! medfuse-engine - Live evidence fusion service
//!
//! Loads configuration, wires collaborators and the EHR directory into the
//! live pipeline, and serves the HTTP/SSE API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use medfuse_common::config::GateMode;
use medfuse_common::events::EventBus;
use medfuse_common::EngineConfig;
use medfuse_engine::collaborators::Collaborators;
use medfuse_engine::services::EhrDirectory;
use medfuse_engine::workflow::LivePipeline;
use medfuse_engine::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for medfuse-engine
#[derive(Parser, Debug)]
#[command(name = "medfuse-engine")]
#[command(about = "Live clinical evidence fusion service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MEDFUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "MEDFUSE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MEDFUSE_PORT")]
    port: Option<u16>,

    /// Question gating mode (full, disabled)
    #[arg(long, env = "MEDFUSE_GATE_MODE")]
    gate_mode: Option<GateMode>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "MEDFUSE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.gate_mode {
            config.gate.mode = mode;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "medfuse_engine={level},medfuse_common={level},tower_http={level}"
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting medfuse-engine v{}", env!("CARGO_PKG_VERSION"));
    info!(
        gate_mode = ?config.gate.mode,
        w_img = config.fusion.w_img,
        w_txt = config.fusion.w_txt,
        topk = config.fusion.topk,
        "Fusion and gate settings"
    );

    let collaborators = Collaborators::from_config(&config.collaborators)
        .context("Failed to initialize collaborators")?;

    let ehr = match &config.collaborators.ehr_json {
        Some(path) => EhrDirectory::load(path),
        None => EhrDirectory::default(),
    };
    info!("EHR directory: {} records", ehr.len());

    let event_bus = EventBus::new(config.server.event_capacity);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let pipeline = LivePipeline::new(Arc::new(config), collaborators, ehr, event_bus);
    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
