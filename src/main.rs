//! # print-relay
//!
//! Print relay binary: loads settings, installs logging and metrics, and
//! serves the WebSocket relay until SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{Authenticator, RelayServer, ServerConfig};
use relay_settings::RelaySettings;
use relay_telemetry::{LogFormat, TelemetryConfig};
use tracing::{info, warn};

/// WebSocket relay between per-tenant print agents and the SaaS job issuer.
#[derive(Parser, Debug)]
#[command(name = "print-relay", version, about)]
struct Cli {
    /// Host to bind (overrides `HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between keep-alive pings (overrides `HEARTBEAT_INTERVAL_SECS`).
    #[arg(long)]
    heartbeat_interval: Option<u64>,

    /// JSON settings file (defaults to `RELAY_SETTINGS`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply command-line flags on top of file and environment settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(secs) = self.heartbeat_interval {
            settings.server.heartbeat_interval_secs = secs;
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn server_config(settings: &RelaySettings) -> ServerConfig {
    let s = &settings.server;
    ServerConfig {
        host: s.host.clone(),
        port: s.port,
        heartbeat_interval_secs: s.heartbeat_interval_secs,
        server_name: s.server_name.clone(),
        max_send_queue: s.max_send_queue,
        max_message_size: s.max_message_size,
        shutdown_timeout_secs: s.shutdown_timeout_secs,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .or_else(relay_settings::settings_path_from_env);
    let mut settings = relay_settings::load_settings(settings_path.as_deref())
        .context("failed to load settings")?;
    cli.apply(&mut settings);

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    relay_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        format,
    })?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to read .env"),
    }

    settings.validate().context("invalid settings")?;
    let secret = settings.shared_secret()?;

    let metrics = relay_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let config = server_config(&settings);
    info!(
        host = %config.host,
        port = config.port,
        heartbeat_secs = config.heartbeat_interval_secs,
        server_name = %config.server_name,
        "starting print relay"
    );

    let server = RelayServer::new(config, Authenticator::new(secret)).with_metrics(metrics);
    let (addr, serve) = server
        .listen()
        .await
        .context("failed to bind listener")?;
    info!(%addr, "ready");

    relay_server::shutdown::wait_for_signal().await;
    server.shutdown_gracefully(serve).await;
    Ok(())
}
