//! Tollgate Worker Daemon

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tollgate_kms::AeadWrapper;
use tollgate_worker::{Config, WorkerConnection};

/// Tollgate worker daemon.
#[derive(Parser, Debug)]
#[command(name = "tollgate-worker", about = "Tollgate worker daemon")]
struct Args {
    /// Controller worker-listener address
    #[arg(long, env = "TOLLGATE_CONTROLLER_ADDR", default_value = "127.0.0.1:9201")]
    controller_addr: String,

    /// Worker name
    #[arg(long, env = "TOLLGATE_WORKER_NAME", default_value = "worker")]
    name: String,

    /// Worker description
    #[arg(long, env = "TOLLGATE_WORKER_DESCRIPTION")]
    description: Option<String>,

    /// Hex-encoded worker-auth wrapping key file
    #[arg(long, env = "TOLLGATE_WRAPPING_KEY", default_value = "worker-auth.key")]
    wrapping_key: PathBuf,

    /// Wrapping key identifier
    #[arg(long, env = "TOLLGATE_WRAPPING_KEY_ID", default_value = "worker-auth")]
    wrapping_key_id: String,

    /// Connect and handshake timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout_secs: u64,

    /// Reconnection delay in seconds
    #[arg(long, default_value = "5")]
    reconnect_delay_secs: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            controller_addr: args.controller_addr,
            name: args.name,
            description: args.description,
            wrapping_key_path: args.wrapping_key,
            wrapping_key_id: args.wrapping_key_id,
            connect_timeout_secs: args.connect_timeout_secs,
            reconnect_delay_secs: args.reconnect_delay_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tollgate=info".parse()?))
        .with_target(true)
        .init();

    // Load config
    let config = Arc::new(Config::from(Args::parse()));

    let wrapper = AeadWrapper::from_key_file(&config.wrapping_key_id, &config.wrapping_key_path)
        .map_err(|e| {
            format!(
                "Failed to read wrapping key from '{}': {}",
                config.wrapping_key_path.display(),
                e
            )
        })?;
    let connection = WorkerConnection::new(config.clone(), Arc::new(wrapper));

    info!(
        name = %config.name,
        controller = %config.controller_addr,
        "Starting Tollgate worker"
    );

    // Reconnection loop. Every attempt mints a fresh nonce.
    loop {
        tokio::select! {
            result = connection.connect_and_run() => match result {
                Ok(()) => info!("Connection closed normally"),
                Err(e) => error!(error = %e, "Connection error"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }

        info!(
            delay_secs = config.reconnect_delay_secs,
            "Reconnecting in {} seconds...", config.reconnect_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(config.reconnect_delay_secs)).await;
    }
}
