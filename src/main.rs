//! Jump Tunnel Command Line Tool
//!
//! This binary is the command-line interface for Jump Tunnel.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use jump_tunnel::config::{load_dotenv, log_config, ArgValues, ConfigLoader, ConfigValidator, TunnelConfig};
use jump_tunnel::{init_logger, Result, TunnelError, Watchdog, APP_NAME, VERSION};

/// Jump Tunnel: forward a local port to a destination behind an SSH jump host
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Load configuration from environment variables
    #[arg(long)]
    from_env: bool,

    /// Jump host as [user@]host[:port]
    #[arg(short, long)]
    jump_host: Option<String>,

    /// Destination as host:port, resolved by the jump host
    #[arg(short, long)]
    destination: Option<String>,

    /// Private key file
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long)]
    passphrase: Option<String>,

    /// Local listen address; port 0 lets the OS pick
    #[arg(short, long)]
    local: Option<String>,

    /// Jump host connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Maximum concurrent forwards
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seconds between health checks, 0 to disable
    #[arg(long)]
    health_interval: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn values(&self) -> ArgValues {
        ArgValues {
            jump_host: self.jump_host.clone(),
            destination: self.destination.clone(),
            private_key: self.key.clone(),
            key_passphrase: self.passphrase.clone(),
            password: None,
            local_addr: self.local.clone(),
            connect_timeout: self.connect_timeout,
            max_connections: self.max_connections,
            health_check_interval: self.health_interval,
            log_level: self.log_level.clone(),
        }
    }
}

fn join_result(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| TunnelError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Resolve when the process is asked to stop
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Variables already in the environment win over the .env file
    let dotenv = load_dotenv(None)?;

    // Defaults < file < environment < command line
    let config = TunnelConfig::load(args.config_file.as_deref(), args.from_env, &args.values())?;

    // Initialize logger
    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    log_config(&config);

    let tunnel = config.tunnel()?;
    let cancel = CancellationToken::new();

    let runner = tunnel.clone();
    let token = cancel.clone();
    let mut handle = tokio::spawn(async move { runner.start(token).await });

    // Either the socket is bound or start already failed
    let ready_limit = Duration::from_secs(config.connect_timeout);
    tokio::select! {
        ready = tunnel.wait_ready_timeout(ready_limit) => {
            if let Err(e) = ready {
                cancel.cancel();
                join_result(handle.await)?;
                return Err(e);
            }
        }
        joined = &mut handle => return join_result(joined),
    }

    info!(
        "Tunnel ready: {} -> {} -> {}",
        tunnel.local_endpoint(),
        tunnel.descriptor().jump(),
        tunnel.descriptor().remote()
    );

    if let Some(interval) = config.health_interval() {
        let watchdog = Watchdog::for_tunnel(&tunnel, interval);
        tokio::spawn(watchdog.run(cancel.child_token()));
    }

    tokio::select! {
        _ = shutdown_signal() => {
            cancel.cancel();
            join_result(handle.await)?;
        }
        joined = &mut handle => join_result(joined)?,
    }

    info!("{} stopped", APP_NAME);
    Ok(())
}
