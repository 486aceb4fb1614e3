//! Per-connection worker credentials.
//!
//! Every connection attempt gets a brand-new key pair, a certificate that
//! only lives for that attempt and a fresh nonce. Reusing any of them would
//! be rejected by the controller as a replay.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{
    date_time_ymd, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use rustls::crypto::aws_lc_rs;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tollgate_core::{ConnectionNonce, WorkerAuthInfo};
use tollgate_kms::Wrapper;

use crate::WorkerError;

/// Credentials for one connection attempt.
pub struct WorkerCredentials {
    info: WorkerAuthInfo,
    cert_der: CertificateDer<'static>,
    key_der: PrivatePkcs8KeyDer<'static>,
    alpn_protocols: Vec<String>,
}

impl WorkerCredentials {
    /// Mint fresh credentials for `name`, sealed with `wrapper`.
    pub async fn mint(
        name: &str,
        description: Option<&str>,
        wrapper: &dyn Wrapper,
    ) -> Result<Self, WorkerError> {
        let nonce = ConnectionNonce::generate();
        let key_pair = KeyPair::generate()?;
        let cert = self_signed_cert(name, &nonce, &key_pair)?;

        let mut info =
            WorkerAuthInfo::new(nonce, cert.pem(), key_pair.serialize_pem()).with_name(name);
        if let Some(description) = description {
            info = info.with_description(description);
        }

        let alpn_protocols = seal_claims(&info, wrapper).await?;

        Ok(Self {
            info,
            cert_der: cert.der().clone(),
            key_der: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
            alpn_protocols,
        })
    }

    /// The claims carried by these credentials.
    pub fn info(&self) -> &WorkerAuthInfo {
        &self.info
    }

    pub fn nonce(&self) -> &ConnectionNonce {
        &self.info.connection_nonce
    }

    /// Certificate presented to, and expected back from, the controller.
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// ALPN identifiers carrying the sealed claims.
    pub fn alpn_protocols(&self) -> &[String] {
        &self.alpn_protocols
    }

    /// Replace the offered ALPN identifiers.
    pub fn with_alpn_protocols(mut self, alpn_protocols: Vec<String>) -> Self {
        self.alpn_protocols = alpn_protocols;
        self
    }

    /// Server name to dial. The controller answers with the worker's own
    /// certificate, whose only DNS name is the nonce.
    pub fn server_name(&self) -> Result<ServerName<'static>, WorkerError> {
        ServerName::try_from(self.nonce().as_str().to_owned())
            .map_err(|e| WorkerError::ServerName(e.to_string()))
    }

    /// TLS client configuration for this attempt.
    ///
    /// Trusts only the minted certificate, presents it as the client
    /// certificate and offers the credential identifiers as ALPN protocols.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, WorkerError> {
        let provider = Arc::new(aws_lc_rs::default_provider());

        let mut roots = RootCertStore::empty();
        roots.add(self.cert_der.clone())?;

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_root_certificates(roots)
            .with_client_auth_cert(
                vec![self.cert_der.clone()],
                PrivateKeyDer::Pkcs8(self.key_der.clone_key()),
            )?;
        config.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect();

        Ok(Arc::new(config))
    }
}

impl fmt::Debug for WorkerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerCredentials")
            .field("info", &self.info)
            .field("alpn_protocols", &self.alpn_protocols.len())
            .finish_non_exhaustive()
    }
}

/// Encrypt `info` with `wrapper` and encode it as ALPN identifiers.
pub async fn seal_claims(
    info: &WorkerAuthInfo,
    wrapper: &dyn Wrapper,
) -> Result<Vec<String>, WorkerError> {
    let json = info.to_json()?;
    let blob = wrapper.encrypt(&json, None).await?;
    Ok(tollgate_proto::encode(&blob.to_base64())?)
}

fn self_signed_cert(
    name: &str,
    nonce: &ConnectionNonce,
    key_pair: &KeyPair,
) -> Result<rcgen::Certificate, WorkerError> {
    let mut params = CertificateParams::new(vec![nonce.to_string()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    params.distinguished_name = dn;

    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyAgreement,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let today = Utc::now().date_naive();
    let tomorrow = today
        .checked_add_days(Days::new(1))
        .ok_or(WorkerError::Validity)?;
    let (year, month, day) = ymd(today)?;
    params.not_before = date_time_ymd(year, month, day);
    let (year, month, day) = ymd(tomorrow)?;
    params.not_after = date_time_ymd(year, month, day);

    Ok(params.self_signed(key_pair)?)
}

fn ymd(date: NaiveDate) -> Result<(i32, u8, u8), WorkerError> {
    let month = u8::try_from(date.month()).map_err(|_| WorkerError::Validity)?;
    let day = u8::try_from(date.day()).map_err(|_| WorkerError::Validity)?;
    Ok((date.year(), month, day))
}
