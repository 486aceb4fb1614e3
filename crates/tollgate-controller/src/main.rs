//! Tollgate Controller Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tollgate_controller::store::SqliteNonceStore;
use tollgate_controller::{http, Config, ControllerState, WorkerAuthenticator, WorkerListener};
use tollgate_kms::{generate_key_hex, AeadWrapper};

/// Tollgate controller: authenticates workers inside the TLS handshake.
#[derive(Parser, Debug)]
#[command(name = "tollgate-controller", about = "Tollgate worker authentication controller")]
struct Args {
    /// Worker TLS listener address
    #[arg(long, env = "TOLLGATE_LISTEN_ADDR", default_value = "127.0.0.1:9201")]
    listen_addr: String,

    /// HTTP (health/metrics) address
    #[arg(long, env = "TOLLGATE_HTTP_ADDR", default_value = "127.0.0.1:9200")]
    http_addr: String,

    /// SQLite database of consumed nonces
    #[arg(long, env = "TOLLGATE_NONCE_DB", default_value = "tollgate-nonces.db")]
    nonce_db: PathBuf,

    /// Hex-encoded worker-auth wrapping key file
    #[arg(long, env = "TOLLGATE_WRAPPING_KEY", default_value = "worker-auth.key")]
    wrapping_key: PathBuf,

    /// Wrapping key identifier
    #[arg(long, env = "TOLLGATE_WRAPPING_KEY_ID", default_value = "worker-auth")]
    wrapping_key_id: String,

    /// Handshake timeout in seconds
    #[arg(long, default_value = "10")]
    handshake_timeout_secs: u64,

    /// Nonce store busy timeout in milliseconds
    #[arg(long, default_value = "2000")]
    store_busy_timeout_ms: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a new random wrapping key to the configured key file
    GenerateKey,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            listen_addr: args.listen_addr,
            http_addr: args.http_addr,
            nonce_db_path: args.nonce_db,
            wrapping_key_path: args.wrapping_key,
            wrapping_key_id: args.wrapping_key_id,
            handshake_timeout_secs: args.handshake_timeout_secs,
            store_busy_timeout_ms: args.store_busy_timeout_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tollgate=info".parse()?))
        .with_target(true)
        .init();

    let command = args.command.take();
    let config = Config::from(args);

    if let Some(Command::GenerateKey) = command {
        if config.wrapping_key_path.exists() {
            return Err(format!(
                "Refusing to overwrite existing key file '{}'",
                config.wrapping_key_path.display()
            )
            .into());
        }
        std::fs::write(&config.wrapping_key_path, generate_key_hex() + "\n")?;
        info!(path = %config.wrapping_key_path.display(), "Wrapping key written");
        return Ok(());
    }

    let listen_addr: SocketAddr = config.listen_addr.parse()?;
    let http_addr: SocketAddr = config.http_addr.parse()?;

    // Load the wrapping key shared with workers
    let wrapper = AeadWrapper::from_key_file(&config.wrapping_key_id, &config.wrapping_key_path)
        .map_err(|e| {
            format!(
                "Failed to load wrapping key from '{}': {}. \
                 Run `tollgate-controller generate-key` first.",
                config.wrapping_key_path.display(),
                e
            )
        })?;

    let store = SqliteNonceStore::open(&config.nonce_db_path, config.store_busy_timeout())?;
    info!(path = %config.nonce_db_path.display(), "Nonce store opened");

    // Create shared state
    let state = ControllerState::new();
    let authenticator = Arc::new(WorkerAuthenticator::new(
        Arc::new(wrapper),
        Arc::new(store),
        Arc::clone(&state.cache),
        Arc::clone(&state.metrics),
    ));
    let listener = WorkerListener::new(authenticator, config.handshake_timeout());

    info!(listen_addr = %listen_addr, http_addr = %http_addr, "Starting Tollgate controller");

    let shutdown = CancellationToken::new();
    let worker_listener = TcpListener::bind(listen_addr).await?;
    let worker_server = listener.serve(worker_listener, shutdown.clone());

    let http_listener = TcpListener::bind(http_addr).await?;
    let http_shutdown = shutdown.clone();
    let http_server = axum::serve(http_listener, http::create_router(state))
        .with_graceful_shutdown(async move { http_shutdown.cancelled().await });

    info!("HTTP server listening on {} (health, metrics)", http_addr);

    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    };

    // Run both servers until shutdown
    let (worker_result, http_result, ()) = tokio::join!(worker_server, http_server, signal);
    if let Err(e) = worker_result {
        error!(error = %e, "Worker listener error");
    }
    if let Err(e) = http_result {
        error!(error = %e, "HTTP server error");
    }

    info!("Tollgate controller stopped");
    Ok(())
}
