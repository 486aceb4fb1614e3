//! Certificate parsing for connection logs.
//!
//! Extracts the Common Name and a SHA-256 fingerprint from the certificate a
//! worker presented, so a connection can be tied back to the claims it was
//! admitted with.

use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::prelude::*;

/// Errors that can occur during certificate extraction.
#[derive(Debug, Error)]
pub enum CertExtractError {
    #[error("failed to parse certificate: {0}")]
    ParseError(String),

    #[error("certificate does not contain a Common Name (CN)")]
    MissingCn,
}

/// What the controller logs about a peer certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Subject Common Name, which workers set to their name.
    pub common_name: String,

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fingerprint: String,
}

/// Inspect a DER-encoded X.509 certificate.
pub fn inspect_peer_cert(cert_der: &[u8]) -> Result<PeerIdentity, CertExtractError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| CertExtractError::ParseError(format!("{:?}", e)))?;

    Ok(PeerIdentity {
        common_name: extract_cn_from_subject(&cert)?,
        fingerprint: hex::encode(Sha256::digest(cert_der)),
    })
}

/// Extract Common Name from certificate subject.
fn extract_cn_from_subject(cert: &X509Certificate<'_>) -> Result<String, CertExtractError> {
    let attr = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or(CertExtractError::MissingCn)?;

    attr.as_str()
        .map(|s| s.to_string())
        .map_err(|e| CertExtractError::ParseError(format!("Failed to parse CN: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn generate_test_cert(cn: Option<&str>) -> Vec<u8> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        if let Some(cn) = cn {
            dn.push(DnType::CommonName, cn);
        }
        params.distinguished_name = dn;

        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        cert.der().to_vec()
    }

    #[test]
    fn test_inspect_extracts_common_name() {
        let cert_der = generate_test_cert(Some("worker-a"));
        let identity = inspect_peer_cert(&cert_der).unwrap();
        assert_eq!(identity.common_name, "worker-a");
        assert_eq!(identity.fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_per_certificate() {
        let a = inspect_peer_cert(&generate_test_cert(Some("worker-a"))).unwrap();
        let b = inspect_peer_cert(&generate_test_cert(Some("worker-a"))).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_missing_cn() {
        let cert_der = generate_test_cert(None);
        assert!(matches!(
            inspect_peer_cert(&cert_der),
            Err(CertExtractError::MissingCn)
        ));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            inspect_peer_cert(b"not der"),
            Err(CertExtractError::ParseError(_))
        ));
    }
}
