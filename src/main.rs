//! videoctl daemon entrypoint

#[cfg(not(feature = "hardware"))]
compile_error!("videoctld requires the `hardware` feature");

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use videoctl::{DevFs, Result, Server, VideoctlConfig, logging};

#[derive(Parser, Debug)]
#[command(
    name = "videoctld",
    version,
    about = "HTTP/JSON control surface for V4L2 video devices"
)]
struct Cli {
    /// Listen address
    #[arg(short = 'i', long, value_name = "IP")]
    listen_ip: Option<String>,

    /// Listen port
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(80..=65535))]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Optional configuration file (toml/yaml). Defaults to videoctl.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory scanned for video nodes
    #[arg(long, value_name = "DIR")]
    dev_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = VideoctlConfig::load(cli.config.as_deref())?;

    if let Some(ip) = cli.listen_ip {
        config.server.bind_address = ip;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.dev_dir {
        config.server.dev_dir = dir;
    }
    config.logging.force_debug = cli.debug;

    logging::init(&config.logging)?;

    let provider = Arc::new(DevFs::new(&config.server.dev_dir));
    let server = Server::bind(&config.server, provider).await?;
    info!(
        addr = %server.local_addr()?,
        dev_dir = %config.server.dev_dir.display(),
        "Starting videoctl server"
    );

    tokio::select! {
        res = server.run() => res,
        signal = shutdown_signal() => {
            info!("Exiting on signal {}", signal?);
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
