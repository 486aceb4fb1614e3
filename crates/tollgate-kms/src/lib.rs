//! Key-management wrappers for Tollgate.
//!
//! A [`Wrapper`] seals plaintext into an [`EncryptedBlob`] and opens it again.
//! Workers seal their auth claims with it and controllers open them during
//! the TLS handshake, so whoever holds the wrapping key decides who may
//! authenticate.

mod aead;
mod error;

use async_trait::async_trait;
use tollgate_proto::EncryptedBlob;

pub use aead::{generate_key_hex, AeadWrapper, KEY_LEN, MECHANISM_AES256_GCM_ENVELOPE};
pub use error::WrapperError;

/// Seals and opens blobs under a key-encryption key.
#[async_trait]
pub trait Wrapper: Send + Sync {
    /// Identifier of the key-encryption key.
    fn key_id(&self) -> &str;

    /// Encrypt `plaintext`, binding the optional associated data.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<EncryptedBlob, WrapperError>;

    /// Decrypt `blob`. The associated data must match what was used to
    /// encrypt it.
    async fn decrypt(&self, blob: &EncryptedBlob, aad: Option<&[u8]>)
        -> Result<Vec<u8>, WrapperError>;
}
