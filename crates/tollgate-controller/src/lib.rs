//! Tollgate Controller Library
//!
//! This crate authenticates worker connections inside the TLS handshake,
//! and provides the nonce stores, listener and operational HTTP surface the
//! controller binary is assembled from.

pub mod config;
pub mod crypto;
pub mod http;
pub mod listener;
pub mod metrics;
pub mod state;
pub mod store;
pub mod workerauth;

pub use config::Config;
pub use listener::WorkerListener;
pub use state::ControllerState;
pub use workerauth::{WorkerAuthError, WorkerAuthenticator};
