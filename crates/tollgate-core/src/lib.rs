//! Tollgate Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/TLS
//! - Database
//! - Runtime specifics
//!
//! All types here describe what a worker asserts about itself when it
//! authenticates to a controller.

pub mod claims;
pub mod error;
pub mod ids;
pub mod purpose;

// Re-export commonly used types
pub use claims::WorkerAuthInfo;
pub use error::CoreError;
pub use ids::ConnectionNonce;
pub use purpose::NoncePurpose;
