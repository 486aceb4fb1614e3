//! Nonce purpose namespaces.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace a nonce is registered under.
///
/// Uniqueness is enforced per `(nonce, purpose)` pair, so the same token may
/// appear once in each namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoncePurpose {
    /// Nonce presented by a worker authenticating its TLS connection.
    #[default]
    WorkerAuth,
}

impl NoncePurpose {
    /// Stable tag persisted in the nonce store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerAuth => "worker-auth",
        }
    }
}

impl fmt::Display for NoncePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_serde_matches_store_tag() {
        let json = serde_json::to_string(&NoncePurpose::WorkerAuth).unwrap();
        assert_eq!(json, format!("\"{}\"", NoncePurpose::WorkerAuth.as_str()));

        let parsed: NoncePurpose = serde_json::from_str("\"worker-auth\"").unwrap();
        assert_eq!(parsed, NoncePurpose::WorkerAuth);
        assert!(serde_json::from_str::<NoncePurpose>("\"session\"").is_err());
    }
}
