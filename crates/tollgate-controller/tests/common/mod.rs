#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use tollgate_controller::store::{MemoryNonceStore, NonceStore, NonceStoreError};
use tollgate_controller::{ControllerState, WorkerAuthenticator};
use tollgate_core::{ConnectionNonce, NoncePurpose};
use tollgate_kms::{generate_key_hex, AeadWrapper, Wrapper, WrapperError};
use tollgate_proto::EncryptedBlob;
use tollgate_worker::WorkerCredentials;

pub const KEY_ID: &str = "worker-auth";

/// Wrapper that counts decryptions.
pub struct CountingWrapper {
    inner: AeadWrapper,
    pub decrypts: AtomicUsize,
}

impl CountingWrapper {
    pub fn new(key_hex: &str) -> Self {
        Self {
            inner: AeadWrapper::from_hex(KEY_ID, key_hex).unwrap(),
            decrypts: AtomicUsize::new(0),
        }
    }

    pub fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Wrapper for CountingWrapper {
    fn key_id(&self) -> &str {
        self.inner.key_id()
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<EncryptedBlob, WrapperError> {
        self.inner.encrypt(plaintext, aad).await
    }

    async fn decrypt(
        &self,
        blob: &EncryptedBlob,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, WrapperError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(blob, aad).await
    }
}

/// Wrapper whose decrypt never completes.
pub struct StalledWrapper;

#[async_trait]
impl Wrapper for StalledWrapper {
    fn key_id(&self) -> &str {
        KEY_ID
    }

    async fn encrypt(
        &self,
        _plaintext: &[u8],
        _aad: Option<&[u8]>,
    ) -> Result<EncryptedBlob, WrapperError> {
        Err(WrapperError::Encrypt)
    }

    async fn decrypt(
        &self,
        _blob: &EncryptedBlob,
        _aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, WrapperError> {
        std::future::pending().await
    }
}

/// Store that counts registrations and delegates to an in-memory store.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryNonceStore,
    pub adds: AtomicUsize,
}

impl CountingStore {
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl NonceStore for CountingStore {
    async fn add_nonce(
        &self,
        nonce: &ConnectionNonce,
        purpose: NoncePurpose,
    ) -> Result<(), NonceStoreError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add_nonce(nonce, purpose).await
    }
}

/// Store that accepts every nonce, as a misconfigured store might.
pub struct ForgetfulStore;

#[async_trait]
impl NonceStore for ForgetfulStore {
    async fn add_nonce(
        &self,
        _nonce: &ConnectionNonce,
        _purpose: NoncePurpose,
    ) -> Result<(), NonceStoreError> {
        Ok(())
    }
}

/// A controller authenticator plus the worker-side key that matches it.
pub struct Harness {
    pub key_hex: String,
    pub wrapper: Arc<CountingWrapper>,
    pub store: Arc<CountingStore>,
    pub state: Arc<ControllerState>,
    pub authenticator: Arc<WorkerAuthenticator>,
}

impl Harness {
    pub fn new() -> Self {
        let key_hex = generate_key_hex();
        let wrapper = Arc::new(CountingWrapper::new(&key_hex));
        let store = Arc::new(CountingStore::default());
        let state = ControllerState::new();
        let authenticator = authenticator(&state, wrapper.clone(), store.clone());
        Self {
            key_hex,
            wrapper,
            store,
            state,
            authenticator,
        }
    }

    /// Wrapper a worker sharing this controller's key would use.
    pub fn worker_wrapper(&self) -> AeadWrapper {
        AeadWrapper::from_hex(KEY_ID, &self.key_hex).unwrap()
    }

    pub async fn mint(&self, name: &str) -> WorkerCredentials {
        WorkerCredentials::mint(name, None, &self.worker_wrapper())
            .await
            .unwrap()
    }
}

pub fn authenticator(
    state: &ControllerState,
    wrapper: Arc<dyn Wrapper>,
    store: Arc<dyn NonceStore>,
) -> Arc<WorkerAuthenticator> {
    Arc::new(WorkerAuthenticator::new(
        wrapper,
        store,
        Arc::clone(&state.cache),
        Arc::clone(&state.metrics),
    ))
}

pub fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}
