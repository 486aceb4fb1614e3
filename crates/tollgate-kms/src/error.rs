//! Wrapper errors.

use thiserror::Error;

/// Errors that can occur while sealing or opening a blob.
#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid hex key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("failed to read key file: {0}")]
    ReadKey(#[from] std::io::Error),

    #[error("key id cannot be empty")]
    EmptyKeyId,

    #[error("blob is missing key info")]
    MissingKeyInfo,

    #[error("blob was wrapped with key '{actual}', expected '{expected}'")]
    KeyIdMismatch { expected: String, actual: String },

    #[error("unsupported wrapping mechanism: {0}")]
    UnsupportedMechanism(u64),

    #[error("invalid iv length: {0}")]
    InvalidIv(usize),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: ciphertext or key did not authenticate")]
    Decrypt,
}
