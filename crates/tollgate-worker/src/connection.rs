//! Connection management for the worker.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use tollgate_kms::Wrapper;

use crate::config::Config;
use crate::credentials::WorkerCredentials;
use crate::WorkerError;

/// Run the TLS handshake over `stream` using `credentials`.
///
/// Succeeds only if the controller accepted the credential and negotiated
/// one of the offered identifiers.
pub async fn handshake<IO>(
    stream: IO,
    credentials: &WorkerCredentials,
) -> Result<TlsStream<IO>, WorkerError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let connector = TlsConnector::from(credentials.client_config()?);
    let tls = connector.connect(credentials.server_name()?, stream).await?;

    let negotiated = tls.get_ref().1.alpn_protocol();
    if !negotiated.is_some_and(|p| credentials.alpn_protocols().iter().any(|o| o.as_bytes() == p)) {
        return Err(WorkerError::ProtocolNotNegotiated);
    }

    Ok(tls)
}

/// Dial the controller at `addr` and authenticate.
pub async fn connect(
    addr: &str,
    credentials: &WorkerCredentials,
) -> Result<TlsStream<TcpStream>, WorkerError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    handshake(stream, credentials).await
}

/// Manages one authenticated session with the controller.
pub struct WorkerConnection {
    config: Arc<Config>,
    wrapper: Arc<dyn Wrapper>,
}

impl WorkerConnection {
    /// Create a new WorkerConnection.
    pub fn new(config: Arc<Config>, wrapper: Arc<dyn Wrapper>) -> Self {
        Self { config, wrapper }
    }

    /// Mint fresh credentials, connect and hold the session open.
    /// Returns on disconnect (caller should handle reconnection).
    pub async fn connect_and_run(&self) -> Result<(), WorkerError> {
        let credentials = WorkerCredentials::mint(
            &self.config.name,
            self.config.description.as_deref(),
            self.wrapper.as_ref(),
        )
        .await?;

        info!(
            addr = %self.config.controller_addr,
            nonce = %credentials.nonce(),
            fragments = credentials.alpn_protocols().len(),
            "Connecting to controller"
        );

        let mut tls = tokio::time::timeout(
            self.config.connect_timeout(),
            connect(&self.config.controller_addr, &credentials),
        )
        .await
        .map_err(|_| WorkerError::Timeout)??;

        info!(nonce = %credentials.nonce(), "Authenticated to controller");

        let received = tokio::io::copy(&mut tls, &mut tokio::io::sink()).await?;
        debug!(bytes = received, "Controller closed the connection");

        Ok(())
    }
}
