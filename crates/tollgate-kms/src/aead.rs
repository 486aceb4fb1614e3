//! AES-256-GCM envelope wrapper.
//!
//! Each call to `encrypt` draws a fresh data key, encrypts the plaintext with
//! it, then wraps the data key under the configured key-encryption key. The
//! wrapped data key travels in `KeyInfo::wrapped_key` as `iv || ciphertext`.

use std::fmt;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use tollgate_proto::{EncryptedBlob, KeyInfo};

use crate::{Wrapper, WrapperError};

/// Key length for AES-256.
pub const KEY_LEN: usize = 32;

/// Mechanism tag recorded in `KeyInfo` for this wrapper.
pub const MECHANISM_AES256_GCM_ENVELOPE: u64 = 1;

const IV_LEN: usize = 12;

/// Envelope-encrypting wrapper around a single AES-256 key-encryption key.
pub struct AeadWrapper {
    key_id: String,
    kek: Aes256Gcm,
}

impl AeadWrapper {
    /// Create a wrapper from raw key bytes.
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self, WrapperError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(WrapperError::EmptyKeyId);
        }
        Ok(Self {
            key_id,
            kek: cipher_for(key)?,
        })
    }

    /// Create a wrapper from a hex-encoded key.
    pub fn from_hex(key_id: impl Into<String>, key_hex: &str) -> Result<Self, WrapperError> {
        let key = hex::decode(key_hex.trim())?;
        Self::new(key_id, &key)
    }

    /// Load a hex-encoded key from a file.
    pub fn from_key_file(
        key_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, WrapperError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_hex(key_id, &contents)
    }

    fn wrap_data_key(&self, data_key: &[u8]) -> Result<Vec<u8>, WrapperError> {
        let iv = random_iv();
        let sealed = self
            .kek
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: data_key,
                    aad: self.key_id.as_bytes(),
                },
            )
            .map_err(|_| WrapperError::Encrypt)?;

        let mut wrapped = Vec::with_capacity(IV_LEN + sealed.len());
        wrapped.extend_from_slice(&iv);
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, WrapperError> {
        if wrapped.len() <= IV_LEN {
            return Err(WrapperError::Decrypt);
        }
        let (iv, sealed) = wrapped.split_at(IV_LEN);
        self.kek
            .decrypt(
                Nonce::from_slice(iv),
                Payload {
                    msg: sealed,
                    aad: self.key_id.as_bytes(),
                },
            )
            .map_err(|_| WrapperError::Decrypt)
    }
}

impl fmt::Debug for AeadWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadWrapper")
            .field("key_id", &self.key_id)
            .field("kek", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl Wrapper for AeadWrapper {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<EncryptedBlob, WrapperError> {
        let mut data_key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut data_key);
        let dek = cipher_for(&data_key)?;

        let iv = random_iv();
        let ciphertext = dek
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: aad.unwrap_or_default(),
                },
            )
            .map_err(|_| WrapperError::Encrypt)?;

        Ok(EncryptedBlob {
            ciphertext,
            iv: iv.to_vec(),
            key_info: Some(KeyInfo {
                mechanism: MECHANISM_AES256_GCM_ENVELOPE,
                key_id: self.key_id.clone(),
                wrapped_key: self.wrap_data_key(&data_key)?,
            }),
        })
    }

    async fn decrypt(
        &self,
        blob: &EncryptedBlob,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, WrapperError> {
        let key_info = blob.key_info.as_ref().ok_or(WrapperError::MissingKeyInfo)?;
        if key_info.key_id != self.key_id {
            return Err(WrapperError::KeyIdMismatch {
                expected: self.key_id.clone(),
                actual: key_info.key_id.clone(),
            });
        }
        if key_info.mechanism != MECHANISM_AES256_GCM_ENVELOPE {
            return Err(WrapperError::UnsupportedMechanism(key_info.mechanism));
        }
        if blob.iv.len() != IV_LEN {
            return Err(WrapperError::InvalidIv(blob.iv.len()));
        }

        let data_key = self.unwrap_data_key(&key_info.wrapped_key)?;
        let dek = cipher_for(&data_key)?;

        dek.decrypt(
            Nonce::from_slice(&blob.iv),
            Payload {
                msg: &blob.ciphertext,
                aad: aad.unwrap_or_default(),
            },
        )
        .map_err(|_| WrapperError::Decrypt)
    }
}

/// Generate a random key-encryption key, hex encoded.
pub fn generate_key_hex() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, WrapperError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| WrapperError::InvalidKeyLength {
        expected: KEY_LEN,
        actual: key.len(),
    })
}

fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
