//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Controller worker-listener address.
    pub controller_addr: String,

    /// Worker name, carried in the claims and the certificate CN.
    pub name: String,

    /// Optional free-form description.
    pub description: Option<String>,

    /// File holding the hex-encoded worker-auth wrapping key.
    pub wrapping_key_path: PathBuf,

    /// Identifier of the wrapping key.
    pub wrapping_key_id: String,

    /// Upper bound on TCP connect plus TLS handshake (seconds).
    pub connect_timeout_secs: u64,

    /// Reconnection delay on connection loss (seconds).
    pub reconnect_delay_secs: u64,
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller_addr: "127.0.0.1:9201".to_string(),
            name: "worker".to_string(),
            description: None,
            wrapping_key_path: PathBuf::from("worker-auth.key"),
            wrapping_key_id: "worker-auth".to_string(),
            connect_timeout_secs: 10,
            reconnect_delay_secs: 5,
        }
    }
}
