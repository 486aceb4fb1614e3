//! Tollgate Worker Library
//!
//! Mints single-use credentials and authenticates to a controller inside the
//! TLS handshake.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;

pub use config::Config;
pub use connection::{connect, handshake, WorkerConnection};
pub use credentials::{seal_claims, WorkerCredentials};
pub use error::WorkerError;
