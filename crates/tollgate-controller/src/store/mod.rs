//! Durable nonce stores.
//!
//! A [`NonceStore`] is the only authority on replay: it must reject a second
//! insert of the same `(nonce, purpose)` pair even when the two inserts come
//! from different controller processes at the same time. Implementations
//! enforce that with a uniqueness constraint in the store itself, never with
//! a lock held by the caller.

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use tollgate_core::{ConnectionNonce, NoncePurpose};

pub use memory::MemoryNonceStore;
pub use sqlite::SqliteNonceStore;

/// Errors from nonce registration.
#[derive(Debug, Error)]
pub enum NonceStoreError {
    /// The pair was already registered.
    #[error("nonce already registered for purpose {purpose}")]
    Duplicate { purpose: NoncePurpose },

    /// The store could not be consulted.
    #[error("nonce store unavailable: {0}")]
    Unavailable(String),
}

/// Shared store of every nonce ever presented.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Atomically register `nonce` under `purpose`.
    ///
    /// Returns `Ok(())` exactly once per pair for the lifetime of the store.
    async fn add_nonce(
        &self,
        nonce: &ConnectionNonce,
        purpose: NoncePurpose,
    ) -> Result<(), NonceStoreError>;
}
