//! HTTP request handlers.

mod health;

pub use health::{health_check, metrics_handler};
