//! waybar-bambu-status - printer status for waybar
//!
//! Every bar runs its own copy. The first one to start owns the socket and
//! the MQTT connection to the printer; the rest attach to it and print what
//! it broadcasts. stdout carries only the JSON line stream, logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bambu_status_broadcaster::{determine_role, relay_to_stdout, OwnerEndpoint, Role, StatusBroadcaster};
use bambu_status_daemon::{default_socket_path, DaemonConfig, PrinterFeed, StatusPipeline};
use bambu_status_format::Layout;

#[derive(Parser, Debug)]
#[command(name = "waybar-bambu-status", version, about)]
struct Cli {
    /// Config file (default: ~/.config/waybar-bambu-status/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket shared between instances (default depends on --layout)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Status line layout: detailed or compact
    #[arg(short, long, default_value_t = Layout::Detailed)]
    layout: Layout,

    /// Print the default config file location and exit
    #[arg(long)]
    print_config_path: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to waybar
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    if cli.print_config_path {
        let path = bambu_status_paths::get_config_path()
            .context("Failed to determine config path")?;
        println!("{}", path.display());
        return Ok(());
    }

    let socket_path = match &cli.socket {
        Some(path) => path.clone(),
        None => default_socket_path(cli.layout)?,
    };

    let role = determine_role(&socket_path)
        .await
        .with_context(|| format!("Failed to claim {}", socket_path.display()))?;
    info!("Running as {} on {}", role.name(), socket_path.display());

    match role {
        Role::Relay(stream) => {
            let relayed = relay_to_stdout(stream).await?;
            info!("Owner went away after {} line(s)", relayed);
            Ok(())
        }
        Role::Owner(endpoint) => run_owner(&cli, endpoint).await,
    }
}

async fn run_owner(cli: &Cli, endpoint: OwnerEndpoint) -> Result<()> {
    // The socket is already bound; relays that connect now wait in the backlog
    let config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config.config_path.display());

    let broadcaster = Arc::new(StatusBroadcaster::new(config.broadcast.options()));
    broadcaster
        .start(endpoint)
        .await
        .context("Failed to start status broadcaster")?;

    let result = serve(&config, cli.layout, Arc::clone(&broadcaster)).await;

    if let Err(e) = broadcaster.stop().await {
        error!("Failed to stop broadcaster: {}", e);
    }
    info!("Stopped");

    result
}

async fn serve(config: &DaemonConfig, layout: Layout, broadcaster: Arc<StatusBroadcaster>) -> Result<()> {
    let feed = PrinterFeed::new(&config.printer)?;
    let pipeline =
        StatusPipeline::new(layout, Arc::clone(&broadcaster)).echo_to(tokio::io::stdout());

    tokio::select! {
        result = feed.run(&pipeline) => result,
        err = broadcaster.listener_failed() => {
            Err(anyhow::Error::new(err).context("Status socket failed"))
        }
        signal = shutdown_signal() => {
            info!("Received {}, shutting down", signal);
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}
