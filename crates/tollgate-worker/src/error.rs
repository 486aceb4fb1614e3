//! Worker errors.

use std::io;

use thiserror::Error;
use tollgate_core::CoreError;
use tollgate_kms::WrapperError;
use tollgate_proto::AlpnError;

/// Errors minting credentials or connecting to a controller.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to generate certificate: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("certificate validity out of range")]
    Validity,

    #[error("failed to encode claims: {0}")]
    Claims(#[from] CoreError),

    #[error("failed to encrypt claims: {0}")]
    Wrap(#[from] WrapperError),

    #[error("failed to encode credential: {0}")]
    Encode(#[from] AlpnError),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name: {0}")]
    ServerName(String),

    #[error("controller did not negotiate the credential protocol")]
    ProtocolNotNegotiated,

    #[error("timed out connecting to controller")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
