//! Worker TLS listener.
//!
//! Reads each ClientHello before choosing a TLS configuration, so the
//! credential offered in the ALPN extension decides which certificate the
//! connection trusts.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::crypto::inspect_peer_cert;
use crate::workerauth::{Admission, AuthCache, WorkerAuthError, WorkerAuthenticator};

/// Errors that end a worker connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("handshake deadline exceeded")]
    HandshakeTimeout,

    #[error("authentication failed: {0}")]
    Auth(#[from] WorkerAuthError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Accepts worker connections and authenticates them in the handshake.
pub struct WorkerListener {
    authenticator: Arc<WorkerAuthenticator>,
    handshake_timeout: Duration,
    tracker: TaskTracker,
}

impl WorkerListener {
    pub fn new(authenticator: Arc<WorkerAuthenticator>, handshake_timeout: Duration) -> Self {
        Self {
            authenticator,
            handshake_timeout,
            tracker: TaskTracker::new(),
        }
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Once cancelled, in-flight connections get up to one handshake timeout
    /// to finish before this returns.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "Worker listener started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let authenticator = Arc::clone(&self.authenticator);
                    let handshake_timeout = self.handshake_timeout;
                    self.tracker.spawn(async move {
                        let result = handle_connection(
                            &authenticator,
                            stream,
                            Some(peer),
                            handshake_timeout,
                        )
                        .await;
                        if let Err(e) = result {
                            debug!(peer = %peer, error = %e, "Worker connection ended");
                        }
                    });
                }
            }
        }

        self.tracker.close();
        info!(in_flight = self.tracker.len(), "Worker listener stopping");
        if tokio::time::timeout(self.handshake_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "Shutdown grace period elapsed with connections open"
            );
        }

        Ok(())
    }
}

/// Authenticate one connection and serve it until the peer closes it.
pub async fn handle_connection<IO>(
    authenticator: &WorkerAuthenticator,
    stream: IO,
    peer: Option<SocketAddr>,
    handshake_timeout: Duration,
) -> Result<(), ConnectionError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + handshake_timeout;
    let (tls, admission) = handshake(authenticator, stream, peer, deadline).await?;
    serve_connection(authenticator.cache(), tls, &admission).await
}

/// Read the ClientHello, authenticate it and complete the handshake, all
/// before `deadline`.
pub async fn handshake<IO>(
    authenticator: &WorkerAuthenticator,
    stream: IO,
    peer: Option<SocketAddr>,
    deadline: Instant,
) -> Result<(TlsStream<IO>, Admission), ConnectionError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let acceptor = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream);
    let start = timeout_at(deadline, acceptor)
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)??;

    let protos: Vec<String> = start
        .client_hello()
        .alpn()
        .map(|offered| {
            offered
                .filter_map(|p| std::str::from_utf8(p).ok())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let admission = authenticator.admit(&protos, deadline, peer).await?;

    let server_config = admission.channel.server_config();
    let completed = timeout_at(deadline, start.into_stream(server_config)).await;
    match completed {
        Ok(Ok(tls)) => {
            authenticator.confirm(&admission);
            Ok((tls, admission))
        }
        Ok(Err(e)) => {
            authenticator.abandon(&admission, &e);
            Err(e.into())
        }
        Err(_) => {
            let err = ConnectionError::HandshakeTimeout;
            authenticator.abandon(&admission, &err);
            Err(err)
        }
    }
}

/// Hold an authenticated connection open until the peer closes it, then
/// evict its cache entry.
pub async fn serve_connection<IO>(
    cache: &AuthCache,
    mut tls: TlsStream<IO>,
    admission: &Admission,
) -> Result<(), ConnectionError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let nonce = admission.entry.nonce().clone();

    if let Some(entry) = cache.get(&nonce) {
        let presented = tls
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| inspect_peer_cert(cert.as_ref()));
        match presented {
            Some(Ok(identity)) => info!(
                worker = %entry.info.name,
                nonce = %nonce,
                cn = %identity.common_name,
                fingerprint = %identity.fingerprint,
                "Worker connected"
            ),
            Some(Err(e)) => {
                warn!(nonce = %nonce, error = %e, "Could not inspect worker certificate")
            }
            None => warn!(nonce = %nonce, "Worker presented no certificate"),
        }
    }

    let result = tokio::io::copy(&mut tls, &mut tokio::io::sink()).await;

    cache.remove(&nonce);
    info!(nonce = %nonce, "Worker disconnected");

    match result {
        Ok(_) => Ok(()),
        // Peers that drop the socket without close_notify are routine.
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
        Err(e) => Err(e.into()),
    }
}
