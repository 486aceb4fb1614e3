//! Per-connection TLS configuration.
//!
//! The controller holds no long-lived CA for workers. Instead each admitted
//! handshake gets a `ServerConfig` whose only trust anchor is the certificate
//! carried in the worker's own claims, and which presents that same
//! certificate back to the worker.

use std::fmt;
use std::sync::Arc;

use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::WebPkiClientVerifier;
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};
use tollgate_core::WorkerAuthInfo;

use super::WorkerAuthError;

/// TLS configuration scoped to one worker connection.
#[derive(Clone)]
pub struct ChannelConfig {
    server_config: Arc<ServerConfig>,
    client_verifier: Arc<dyn ClientCertVerifier>,
    trust_anchor: CertificateDer<'static>,
    pinned_protocol: String,
}

impl ChannelConfig {
    /// Build the configuration for `info`, negotiating only `pinned_protocol`.
    pub fn build(info: &WorkerAuthInfo, pinned_protocol: &str) -> Result<Self, WorkerAuthError> {
        let cert = parse_certificate(&info.cert_pem)?;
        let key = parse_private_key(&info.key_pem)?;

        let provider = Arc::new(aws_lc_rs::default_provider());
        check_key_pair(&provider, &cert, &key)?;

        let mut roots = RootCertStore::empty();
        roots
            .add(cert.clone())
            .map_err(|e| invalid(format!("error adding certificate to trust pool: {e}")))?;

        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .map_err(|e| invalid(format!("error building client verifier: {e}")))?;

        let mut server_config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| invalid(e.to_string()))?
            .with_client_cert_verifier(Arc::clone(&client_verifier))
            .with_single_cert(vec![cert.clone()], key)
            .map_err(|e| invalid(format!("error building server config: {e}")))?;
        server_config.alpn_protocols = vec![pinned_protocol.as_bytes().to_vec()];

        Ok(Self {
            server_config: Arc::new(server_config),
            client_verifier,
            trust_anchor: cert,
            pinned_protocol: pinned_protocol.to_string(),
        })
    }

    /// Configuration used to complete the handshake.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// Verifier requiring client certificates issued by the trust anchor.
    pub fn client_verifier(&self) -> &Arc<dyn ClientCertVerifier> {
        &self.client_verifier
    }

    /// The single certificate this connection trusts.
    pub fn trust_anchor(&self) -> &CertificateDer<'static> {
        &self.trust_anchor
    }

    /// The only ALPN protocol the server will negotiate.
    pub fn pinned_protocol(&self) -> &str {
        &self.pinned_protocol
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("pinned_protocol", &self.pinned_protocol)
            .field("trust_anchor_len", &self.trust_anchor.len())
            .finish_non_exhaustive()
    }
}

fn invalid(msg: impl Into<String>) -> WorkerAuthError {
    WorkerAuthError::InvalidCertMaterial(msg.into())
}

fn parse_certificate(cert_pem: &[u8]) -> Result<CertificateDer<'static>, WorkerAuthError> {
    let blocks = pem::parse_many(cert_pem)
        .map_err(|e| invalid(format!("error parsing certificate: {e}")))?;

    let mut certs = blocks.into_iter().filter(|b| b.tag() == "CERTIFICATE");
    let (Some(cert), None) = (certs.next(), certs.next()) else {
        return Err(invalid("expected exactly one certificate"));
    };

    Ok(CertificateDer::from(cert.into_contents()))
}

fn parse_private_key(key_pem: &[u8]) -> Result<PrivateKeyDer<'static>, WorkerAuthError> {
    let blocks = pem::parse_many(key_pem)
        .map_err(|e| invalid(format!("error parsing private key: {e}")))?;

    let mut keys = blocks
        .into_iter()
        .filter_map(|b| -> Option<PrivateKeyDer<'static>> {
            match b.tag() {
                "PRIVATE KEY" => Some(PrivatePkcs8KeyDer::from(b.into_contents()).into()),
                "EC PRIVATE KEY" => Some(PrivateSec1KeyDer::from(b.into_contents()).into()),
                "RSA PRIVATE KEY" => Some(PrivatePkcs1KeyDer::from(b.into_contents()).into()),
                _ => None,
            }
        });
    let (Some(key), None) = (keys.next(), keys.next()) else {
        return Err(invalid("expected exactly one private key"));
    };

    Ok(key)
}

fn check_key_pair(
    provider: &CryptoProvider,
    cert: &CertificateDer<'static>,
    key: &PrivateKeyDer<'static>,
) -> Result<(), WorkerAuthError> {
    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| invalid(format!("error loading private key: {e}")))?;

    CertifiedKey::new(vec![cert.clone()], signing_key)
        .keys_match()
        .map_err(|e| invalid(format!("certificate and key do not match: {e}")))
}
