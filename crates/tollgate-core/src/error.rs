//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Tollgate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Connection nonce is empty.
    #[error("Connection nonce cannot be empty")]
    EmptyNonce,

    /// Claims carry a purpose other than the one expected at this call site.
    #[error("Unexpected nonce purpose: expected {expected}, got {actual}")]
    UnexpectedPurpose { expected: String, actual: String },

    /// Certificate or key material missing from the claims.
    #[error("Missing {0} in worker auth info")]
    MissingMaterial(&'static str),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
