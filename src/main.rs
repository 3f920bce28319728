#![forbid(unsafe_code)]

//! `ghl-mcp-server`: MCP tool server binary.
//!
//! Loads configuration, assembles the tool registry from the built-in
//! providers and serves the HTTP/SSE transport until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ghl_mcp_server::config::GlobalConfig;
use ghl_mcp_server::mcp::dispatcher::Dispatcher;
use ghl_mcp_server::mcp::http::{self, AppState};
use ghl_mcp_server::mcp::registry::ToolRegistry;
use ghl_mcp_server::mcp::tools;
use ghl_mcp_server::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "ghl-mcp-server",
    about = "MCP tool server over HTTP/SSE",
    version,
    long_about = None
)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port; overrides both the config file and `PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("ghl-mcp-server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    info!(bind = %config.bind_addr(), "configuration loaded");

    // ── Assemble registry and dispatcher ────────────────
    let registry = Arc::new(ToolRegistry::load(tools::builtin_providers())?);
    let dispatcher = Dispatcher::new(
        registry,
        config.server_info(),
        config.protocol_version.clone(),
    );
    let state = Arc::new(AppState::new(dispatcher, &config));

    // ── Serve until shutdown ────────────────────────────
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let bind = config.bind_addr();
    let mut server = tokio::spawn(async move { http::serve(state, bind, server_ct).await });

    info!("MCP server ready");

    let joined = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            server.await
        }
        joined = &mut server => joined,
    };

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(%err, "http transport failed");
            return Err(err);
        }
        Err(err) => return Err(AppError::Transport(format!("server task failed: {err}"))),
    }

    info!("ghl-mcp-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
