//! bdr-mock-server: BDR mock server.
//!
//! Accepts gateway SOAP requests over TLS, acknowledges each one
//! synchronously, and sends the correlated asynchronous reply to the
//! configured gateway peer over a new mutually-authenticated connection.

mod config;
mod outbound;
mod server;
mod tls;

use anyhow::Context;
use bdr_core::{ReplyDispatcher, RouteTable, TemplateStore};
use clap::Parser;
use config::{CliOverrides, ServerConfig};
use outbound::HttpsReplyTransport;
use server::BdrServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Timestamp format stamped into every reply.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// bdr-mock-server: BDR mock server
#[derive(Parser, Debug)]
#[command(name = "bdr-mock-server", version, about = "BDR mock server")]
struct Cli {
    /// Gateway port that receives asynchronous replies
    #[arg(long)]
    client_port: Option<u16>,

    /// Gateway host that receives asynchronous replies
    #[arg(long)]
    client_address: Option<String>,

    /// Gateway OS family (WIN or LINUX)
    #[arg(long)]
    client_os: Option<bdr_core::PeerOs>,

    /// Listen port
    #[arg(long)]
    server_port: Option<u16>,

    /// Listen address
    #[arg(long)]
    listen_address: Option<String>,

    /// TLS certificate (PEM)
    #[arg(long)]
    cert: Option<String>,

    /// TLS private key (PEM); defaults to the certificate file
    #[arg(long)]
    key: Option<String>,

    /// Trust anchors for the gateway's certificate (PEM)
    #[arg(long)]
    ca: Option<String>,

    /// Reply template directory
    #[arg(long)]
    templates: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.bdr-mock/config.toml")]
    config: String,

    /// Require and verify client certificates on inbound connections
    #[arg(long)]
    require_client_cert: bool,

    /// Handle one request (ack and reply) at a time
    #[arg(long)]
    serial: bool,

    /// Generate self-signed certificate for development
    #[arg(long)]
    generate_cert: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Fixed for the life of the process.
    let started_at = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %started_at,
        "starting bdr-mock-server"
    );

    tokio::select! {
        result = run(cli, started_at) => {
            if let Err(e) = result {
                error!(error = %format!("{e:#}"), "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("bdr-mock-server stopped");
}

async fn run(cli: Cli, started_at: String) -> anyhow::Result<()> {
    let mut overrides = CliOverrides {
        listen_address: cli.listen_address,
        server_port: cli.server_port,
        cert: cli.cert,
        key: cli.key,
        ca: cli.ca,
        templates: cli.templates,
        client_address: cli.client_address,
        client_port: cli.client_port,
        client_os: cli.client_os,
        require_client_cert: cli.require_client_cert,
        serial: cli.serial,
    };

    if cli.generate_cert {
        let (cert, key) = tls::generate_self_signed_cert()
            .context("failed to generate self-signed certificate")?;
        info!(cert = %cert.display(), key = %key.display(), "generated self-signed certificate");
        let cert = cert.to_string_lossy().into_owned();
        if overrides.ca.is_none() {
            overrides.ca = Some(cert.clone());
        }
        overrides.cert = Some(cert);
        overrides.key = Some(key.to_string_lossy().into_owned());
    }

    let config_path = PathBuf::from(&cli.config);
    let server_config =
        ServerConfig::load(Some(&config_path), &overrides).context("failed to load config")?;

    let templates = TemplateStore::load_dir(&server_config.templates_dir)
        .context("failed to load reply templates")?;

    let tls_config = tls::server_config(&server_config).context("failed to load TLS config")?;
    if !server_config.require_client_cert {
        warn!("client certificates are not requested on inbound connections");
    }

    let transport = HttpsReplyTransport::new(&server_config)
        .context("failed to build reply client")?;
    let dispatcher = ReplyDispatcher::new(
        server_config.peer.clone(),
        RouteTable::default(),
        templates,
        started_at,
        Arc::new(transport),
    );

    BdrServer::new(server_config, dispatcher)
        .run(Arc::new(tls_config))
        .await
        .context("listener failed")
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
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
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
