//! Wire formats for Tollgate.
//!
//! This crate contains:
//! - Protobuf messages exchanged with the key-management wrapper
//! - The ALPN credential codec that carries an encrypted worker credential
//!   through TLS protocol negotiation

pub mod alpn;
pub mod blob;

// Re-export commonly used types
pub use alpn::{assemble, encode, AlpnError, AssembledCredential, WORKER_AUTH_PREFIX};
pub use blob::{BlobError, EncryptedBlob, KeyInfo};
