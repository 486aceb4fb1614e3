//! Worker authentication inside the TLS handshake.
//!
//! A connecting worker offers its encrypted claims as ALPN identifiers. The
//! [`WorkerAuthenticator`] reassembles and decrypts them, consumes the
//! claims' nonce in the shared store and synthesizes a TLS configuration that
//! trusts only the certificate the worker just presented.

mod cache;
mod channel;
mod decrypt;
mod error;
mod replay;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tollgate_core::WorkerAuthInfo;
use tollgate_kms::Wrapper;

use crate::metrics::AuthMetrics;
use crate::store::NonceStore;

pub use cache::{AuthCache, CacheEntry, CacheError};
pub use channel::ChannelConfig;
pub use decrypt::CredentialDecryptor;
pub use error::{AuthErrorKind, WorkerAuthError};
pub use replay::ReplayGuard;

/// Progress of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    ReceivedHello,
    Assembling,
    Decrypting,
    ReplayCheck,
    BuildingConfig,
    Authenticated,
}

impl AuthStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceivedHello => "received_hello",
            Self::Assembling => "assembling",
            Self::Decrypting => "decrypting",
            Self::ReplayCheck => "replay_check",
            Self::BuildingConfig => "building_config",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handshake that passed authentication and was recorded in the cache.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Configuration for completing this connection's handshake.
    pub channel: ChannelConfig,

    /// The cache entry written for this connection.
    pub entry: Arc<CacheEntry>,
}

struct Rejection {
    stage: AuthStage,
    error: WorkerAuthError,
}

impl Rejection {
    fn at(stage: AuthStage) -> impl FnOnce(WorkerAuthError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Runs the authentication pipeline for each handshake.
pub struct WorkerAuthenticator {
    decryptor: CredentialDecryptor,
    replay: ReplayGuard,
    cache: Arc<AuthCache>,
    metrics: Arc<AuthMetrics>,
}

impl WorkerAuthenticator {
    pub fn new(
        wrapper: Arc<dyn Wrapper>,
        store: Arc<dyn NonceStore>,
        cache: Arc<AuthCache>,
        metrics: Arc<AuthMetrics>,
    ) -> Self {
        Self {
            decryptor: CredentialDecryptor::new(wrapper),
            replay: ReplayGuard::new(store),
            cache,
            metrics,
        }
    }

    /// Cache shared with the connection handler.
    pub fn cache(&self) -> &Arc<AuthCache> {
        &self.cache
    }

    /// Authenticate the credential carried in `protos`.
    ///
    /// Has no side effect besides consuming the nonce in the store. The
    /// decryption and store calls are bounded by `deadline`.
    pub async fn authenticate(
        &self,
        protos: &[String],
        deadline: Instant,
    ) -> Result<(ChannelConfig, WorkerAuthInfo), WorkerAuthError> {
        self.run(protos, deadline).await.map_err(|r| r.error)
    }

    /// Authenticate, then record the connection in the cache.
    ///
    /// The connection only counts as admitted once its handshake completes,
    /// see [`WorkerAuthenticator::confirm`] and [`WorkerAuthenticator::abandon`].
    pub async fn admit(
        &self,
        protos: &[String],
        deadline: Instant,
        peer: Option<SocketAddr>,
    ) -> Result<Admission, WorkerAuthError> {
        let result = self.run(protos, deadline).await.and_then(|(channel, info)| {
            let nonce = info.connection_nonce.clone();
            self.cache
                .insert_once(CacheEntry::new(info, peer))
                .map(|entry| Admission { channel, entry })
                .map_err(|_| Rejection {
                    stage: AuthStage::Authenticated,
                    error: WorkerAuthError::ReplayDetected(nonce),
                })
        });

        match result {
            Ok(admission) => {
                debug!(
                    stage = %AuthStage::Authenticated,
                    worker = %admission.entry.info.name,
                    nonce = %admission.entry.nonce(),
                    peer = ?peer,
                    "Worker credential accepted"
                );
                Ok(admission)
            }
            Err(Rejection { stage, error }) => {
                let kind = error.kind();
                self.metrics.record_rejected(kind);
                if kind == AuthErrorKind::StorageUnavailable {
                    error!(
                        stage = %stage,
                        kind = %kind,
                        peer = ?peer,
                        error = %error,
                        "Worker authentication failed"
                    );
                } else {
                    warn!(
                        stage = %stage,
                        kind = %kind,
                        peer = ?peer,
                        error = %error,
                        "Worker authentication rejected"
                    );
                }
                Err(error)
            }
        }
    }

    /// Count an admission whose TLS handshake completed.
    pub fn confirm(&self, admission: &Admission) {
        self.metrics.record_admitted();
        info!(
            worker = %admission.entry.info.name,
            nonce = %admission.entry.nonce(),
            peer = ?admission.entry.peer_addr,
            "Worker authenticated"
        );
    }

    /// Evict an admission whose TLS handshake failed after authentication.
    ///
    /// The nonce stays consumed. A peer that holds a valid credential but
    /// cannot finish the handshake is usually replaying captured claims
    /// without the matching private key.
    pub fn abandon(&self, admission: &Admission, reason: &dyn fmt::Display) {
        self.cache.remove(admission.entry.nonce());
        self.metrics.record_handshake_failed();
        warn!(
            worker = %admission.entry.info.name,
            nonce = %admission.entry.nonce(),
            peer = ?admission.entry.peer_addr,
            reason = %reason,
            "Worker handshake failed after authentication"
        );
    }

    async fn run(
        &self,
        protos: &[String],
        deadline: Instant,
    ) -> Result<(ChannelConfig, WorkerAuthInfo), Rejection> {
        debug!(
            stage = %AuthStage::ReceivedHello,
            offered = protos.len(),
            "ClientHello received"
        );

        let assembled = tollgate_proto::assemble(protos)
            .map_err(WorkerAuthError::from)
            .map_err(Rejection::at(AuthStage::Assembling))?;
        debug!(
            stage = %AuthStage::Assembling,
            version = assembled.version,
            len = assembled.encoded.len(),
            "Credential assembled"
        );

        let info = self
            .decryptor
            .decrypt(&assembled.encoded, deadline)
            .await
            .map_err(Rejection::at(AuthStage::Decrypting))?;
        debug!(
            stage = %AuthStage::Decrypting,
            nonce = %info.connection_nonce,
            "Credential decrypted"
        );

        self.replay
            .check(&info.connection_nonce, deadline)
            .await
            .map_err(Rejection::at(AuthStage::ReplayCheck))?;

        let channel = ChannelConfig::build(&info, &assembled.pinned_protocol)
            .map_err(Rejection::at(AuthStage::BuildingConfig))?;

        Ok((channel, info))
    }
}

impl fmt::Debug for WorkerAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAuthenticator")
            .field("decryptor", &self.decryptor)
            .field("cache_len", &self.cache.len())
            .finish_non_exhaustive()
    }
}
