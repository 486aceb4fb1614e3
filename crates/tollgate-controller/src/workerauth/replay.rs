//! Replay guard.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tollgate_core::{ConnectionNonce, NoncePurpose};

use super::WorkerAuthError;
use crate::store::{NonceStore, NonceStoreError};

/// Registers each presented nonce in the shared store exactly once.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn NonceStore>,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn NonceStore>) -> Self {
        Self { store }
    }

    /// Consume `nonce` for worker authentication.
    ///
    /// The store's uniqueness constraint decides the race between concurrent
    /// presentations of the same nonce, so no lock is taken here.
    pub async fn check(
        &self,
        nonce: &ConnectionNonce,
        deadline: Instant,
    ) -> Result<(), WorkerAuthError> {
        match timeout_at(deadline, self.store.add_nonce(nonce, NoncePurpose::WorkerAuth)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(NonceStoreError::Duplicate { .. })) => {
                Err(WorkerAuthError::ReplayDetected(nonce.clone()))
            }
            Ok(Err(NonceStoreError::Unavailable(msg))) => {
                Err(WorkerAuthError::StorageUnavailable(msg))
            }
            Err(_) => Err(WorkerAuthError::StorageUnavailable(
                "nonce store deadline exceeded".into(),
            )),
        }
    }
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::MemoryNonceStore;

    /// Store that never answers.
    struct StalledStore;

    #[async_trait]
    impl NonceStore for StalledStore {
        async fn add_nonce(
            &self,
            _nonce: &ConnectionNonce,
            _purpose: NoncePurpose,
        ) -> Result<(), NonceStoreError> {
            std::future::pending().await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl NonceStore for BrokenStore {
        async fn add_nonce(
            &self,
            _nonce: &ConnectionNonce,
            _purpose: NoncePurpose,
        ) -> Result<(), NonceStoreError> {
            Err(NonceStoreError::Unavailable("database is locked".into()))
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_second_presentation_is_replay() {
        let guard = ReplayGuard::new(Arc::new(MemoryNonceStore::new()));
        let nonce = ConnectionNonce::new("n1");

        guard.check(&nonce, deadline()).await.unwrap();
        assert!(matches!(
            guard.check(&nonce, deadline()).await,
            Err(WorkerAuthError::ReplayDetected(n)) if n == nonce
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_replay() {
        let guard = ReplayGuard::new(Arc::new(BrokenStore));
        assert!(matches!(
            guard.check(&ConnectionNonce::new("n1"), deadline()).await,
            Err(WorkerAuthError::StorageUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_hits_deadline() {
        let guard = ReplayGuard::new(Arc::new(StalledStore));
        let deadline = Instant::now() + Duration::from_millis(50);

        assert!(matches!(
            guard.check(&ConnectionNonce::new("n1"), deadline).await,
            Err(WorkerAuthError::StorageUnavailable(_))
        ));
    }
}
