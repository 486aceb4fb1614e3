//! Encrypted blob messages.
//!
//! Field numbers follow the key-management wrapper's protobuf schema so blobs
//! produced by other wrapper implementations decode unchanged.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use prost::Message;
use thiserror::Error;

/// Errors decoding an encrypted blob from its transport encoding.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Ciphertext plus the metadata needed to unwrap it.
#[derive(Clone, PartialEq, Message)]
pub struct EncryptedBlob {
    /// Encrypted payload.
    #[prost(bytes = "vec", tag = "1")]
    pub ciphertext: Vec<u8>,

    /// Nonce used to encrypt `ciphertext`.
    #[prost(bytes = "vec", tag = "2")]
    pub iv: Vec<u8>,

    /// Key-wrapping metadata.
    #[prost(message, optional, tag = "5")]
    pub key_info: Option<KeyInfo>,
}

/// Identifies the wrapping key and carries the wrapped data key.
#[derive(Clone, PartialEq, Message)]
pub struct KeyInfo {
    /// Wrapping mechanism identifier.
    #[prost(uint64, tag = "1")]
    pub mechanism: u64,

    /// Identifier of the key-encryption key.
    #[prost(string, tag = "2")]
    pub key_id: String,

    /// Data-encryption key, encrypted under `key_id`.
    #[prost(bytes = "vec", tag = "3")]
    pub wrapped_key: Vec<u8>,
}

impl EncryptedBlob {
    /// Encode as unpadded standard base64 of the protobuf bytes.
    pub fn to_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.encode_to_vec())
    }

    /// Decode from unpadded standard base64 of the protobuf bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, BlobError> {
        let bytes = STANDARD_NO_PAD.decode(encoded)?;
        Ok(Self::decode(bytes.as_slice())?)
    }

    /// Wrapping key identifier, if present.
    pub fn key_id(&self) -> Option<&str> {
        self.key_info.as_ref().map(|k| k.key_id.as_str())
    }
}
