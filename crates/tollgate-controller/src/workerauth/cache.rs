//! Auth result cache.
//!
//! The handshake path writes one entry per admitted connection and the
//! connection handler reads it back by nonce. Entries are immutable once
//! inserted and are removed when the connection closes.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tollgate_core::{ConnectionNonce, WorkerAuthInfo};

/// Errors from cache writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache already holds an entry for nonce {0}")]
    AlreadyPresent(ConnectionNonce),
}

/// Validated claims for one live connection.
#[derive(Debug)]
pub struct CacheEntry {
    /// Claims recovered during the handshake.
    pub info: WorkerAuthInfo,

    /// Remote address, when the driver knows it.
    pub peer_addr: Option<SocketAddr>,

    /// When the handshake was admitted.
    pub admitted_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(info: WorkerAuthInfo, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            info,
            peer_addr,
            admitted_at: Utc::now(),
        }
    }

    pub fn nonce(&self) -> &ConnectionNonce {
        &self.info.connection_nonce
    }
}

/// Nonce-keyed map from handshake to connection handler.
#[derive(Debug, Default)]
pub struct AuthCache {
    entries: DashMap<ConnectionNonce, Arc<CacheEntry>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry`, refusing to overwrite an existing one.
    pub fn insert_once(&self, entry: CacheEntry) -> Result<Arc<CacheEntry>, CacheError> {
        match self.entries.entry(entry.nonce().clone()) {
            Entry::Occupied(occupied) => Err(CacheError::AlreadyPresent(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(entry);
                vacant.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    pub fn get(&self, nonce: &ConnectionNonce) -> Option<Arc<CacheEntry>> {
        self.entries.get(nonce).map(|e| Arc::clone(e.value()))
    }

    pub fn remove(&self, nonce: &ConnectionNonce) -> Option<Arc<CacheEntry>> {
        self.entries.remove(nonce).map(|(_, entry)| entry)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
