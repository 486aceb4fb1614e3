//! Shared controller state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::metrics::AuthMetrics;
use crate::workerauth::AuthCache;

/// State shared by the worker listener and the HTTP router.
#[derive(Debug)]
pub struct ControllerState {
    /// Authenticated connections, keyed by nonce.
    pub cache: Arc<AuthCache>,

    /// Handshake outcome counters.
    pub metrics: Arc<AuthMetrics>,

    /// When this controller started.
    pub started_at: DateTime<Utc>,
}

impl ControllerState {
    /// Create a new ControllerState wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            cache: Arc::new(AuthCache::new()),
            metrics: Arc::new(AuthMetrics::new()),
            started_at: Utc::now(),
        }
    }
}
