//! Controller configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker TLS listener bind address.
    pub listen_addr: String,

    /// HTTP (health/metrics) bind address.
    pub http_addr: String,

    /// SQLite database holding consumed nonces. Every controller sharing
    /// this file rejects each other's replays.
    pub nonce_db_path: PathBuf,

    /// File holding the hex-encoded worker-auth wrapping key.
    pub wrapping_key_path: PathBuf,

    /// Identifier of the wrapping key.
    pub wrapping_key_id: String,

    /// Upper bound on one worker handshake, including decryption and the
    /// nonce store round trip (seconds).
    pub handshake_timeout_secs: u64,

    /// How long a nonce insert waits on a locked database (milliseconds).
    pub store_busy_timeout_ms: u64,
}

impl Config {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn store_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store_busy_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9201".to_string(),
            http_addr: "127.0.0.1:9200".to_string(),
            nonce_db_path: PathBuf::from("tollgate-nonces.db"),
            wrapping_key_path: PathBuf::from("worker-auth.key"),
            wrapping_key_id: "worker-auth".to_string(),
            handshake_timeout_secs: 10,
            store_busy_timeout_ms: 2000,
        }
    }
}
