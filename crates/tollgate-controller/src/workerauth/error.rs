//! Worker authentication errors.
//!
//! Every rejected handshake maps to exactly one [`AuthErrorKind`] so that
//! operators can tell a confirmed replay apart from a store that could not be
//! consulted.

use std::fmt;

use thiserror::Error;
use tollgate_core::ConnectionNonce;
use tollgate_proto::AlpnError;

/// Errors that abort a worker's TLS handshake.
#[derive(Debug, Error)]
pub enum WorkerAuthError {
    #[error("malformed credential: {0}")]
    MalformedCredential(#[from] AlpnError),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("connection nonce already used: {0}")]
    ReplayDetected(ConnectionNonce),

    #[error("nonce store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid certificate material: {0}")]
    InvalidCertMaterial(String),
}

impl WorkerAuthError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MalformedCredential(_) => AuthErrorKind::MalformedCredential,
            Self::DecryptionFailed(_) => AuthErrorKind::DecryptionFailed,
            Self::ReplayDetected(_) => AuthErrorKind::ReplayDetected,
            Self::StorageUnavailable(_) => AuthErrorKind::StorageUnavailable,
            Self::InvalidCertMaterial(_) => AuthErrorKind::InvalidCertMaterial,
        }
    }
}

/// Fieldless mirror of [`WorkerAuthError`] for logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    MalformedCredential,
    DecryptionFailed,
    ReplayDetected,
    StorageUnavailable,
    InvalidCertMaterial,
}

impl AuthErrorKind {
    /// All kinds, in taxonomy order.
    pub const ALL: [AuthErrorKind; 5] = [
        Self::MalformedCredential,
        Self::DecryptionFailed,
        Self::ReplayDetected,
        Self::StorageUnavailable,
        Self::InvalidCertMaterial,
    ];

    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedCredential => "malformed_credential",
            Self::DecryptionFailed => "decryption_failed",
            Self::ReplayDetected => "replay_detected",
            Self::StorageUnavailable => "storage_unavailable",
            Self::InvalidCertMaterial => "invalid_cert_material",
        }
    }

    /// Index into [`AuthErrorKind::ALL`].
    pub(crate) fn index(&self) -> usize {
        match self {
            Self::MalformedCredential => 0,
            Self::DecryptionFailed => 1,
            Self::ReplayDetected => 2,
            Self::StorageUnavailable => 3,
            Self::InvalidCertMaterial => 4,
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
