//! Worker authentication claims.
//!
//! A worker mints a fresh set of claims for every connection attempt: a
//! one-shot certificate/key pair and a nonce. The claims travel encrypted
//! inside the TLS ClientHello and are never persisted by the controller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ConnectionNonce, CoreError, NoncePurpose};

/// Identity claims recovered from a decrypted worker credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAuthInfo {
    /// Anti-replay token, unique within `purpose`.
    pub connection_nonce: ConnectionNonce,

    /// PEM-encoded certificate. Acts as both the trust anchor and the
    /// presented certificate for this one connection.
    #[serde(with = "base64_bytes")]
    pub cert_pem: Vec<u8>,

    /// PEM-encoded private key matching `cert_pem`.
    #[serde(with = "base64_bytes")]
    pub key_pem: Vec<u8>,

    /// Namespace of the nonce.
    pub purpose: NoncePurpose,

    /// Worker name.
    #[serde(default)]
    pub name: String,

    /// Free-form worker description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkerAuthInfo {
    /// Create claims for the worker-auth purpose.
    pub fn new(
        connection_nonce: ConnectionNonce,
        cert_pem: impl Into<Vec<u8>>,
        key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            connection_nonce,
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
            purpose: NoncePurpose::WorkerAuth,
            name: String::new(),
            description: None,
        }
    }

    /// Builder method to set the worker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set the worker description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parse claims from their JSON encoding.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize claims to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check the structural invariants the controller relies on.
    ///
    /// Whether the certificate and key actually form a pair is checked later,
    /// when the TLS configuration is built.
    pub fn validate(&self, expected: NoncePurpose) -> Result<(), CoreError> {
        if self.connection_nonce.is_empty() {
            return Err(CoreError::EmptyNonce);
        }
        if self.purpose != expected {
            return Err(CoreError::UnexpectedPurpose {
                expected: expected.to_string(),
                actual: self.purpose.to_string(),
            });
        }
        if self.cert_pem.is_empty() {
            return Err(CoreError::MissingMaterial("certificate"));
        }
        if self.key_pem.is_empty() {
            return Err(CoreError::MissingMaterial("private key"));
        }
        Ok(())
    }
}

impl fmt::Debug for WorkerAuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAuthInfo")
            .field("connection_nonce", &self.connection_nonce)
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"[REDACTED]")
            .field("purpose", &self.purpose)
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Byte fields are carried as standard padded base64 strings in JSON.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
