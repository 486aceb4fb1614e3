//! Certificate inspection for authenticated connections.

mod cert_extractor;

pub use cert_extractor::{inspect_peer_cert, CertExtractError, PeerIdentity};
