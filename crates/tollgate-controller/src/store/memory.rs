//! In-process nonce store.
//!
//! Only safe as a replay authority when a single controller process serves
//! all workers. Used in development and tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tollgate_core::{ConnectionNonce, NoncePurpose};

use super::{NonceStore, NonceStoreError};

/// Nonce store backed by a sharded map.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    nonces: DashMap<(String, NoncePurpose), chrono::DateTime<chrono::Utc>>,
}

impl MemoryNonceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nonces.
    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    /// Whether no nonce has been registered.
    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, nonce: &ConnectionNonce, purpose: NoncePurpose) -> bool {
        self.nonces.contains_key(&(nonce.as_str().to_owned(), purpose))
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn add_nonce(
        &self,
        nonce: &ConnectionNonce,
        purpose: NoncePurpose,
    ) -> Result<(), NonceStoreError> {
        // The entry API holds the shard lock across check and insert
        match self.nonces.entry((nonce.as_str().to_owned(), purpose)) {
            Entry::Occupied(_) => Err(NonceStoreError::Duplicate { purpose }),
            Entry::Vacant(slot) => {
                slot.insert(chrono::Utc::now());
                Ok(())
            }
        }
    }
}
