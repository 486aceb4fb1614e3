//! ALPN credential codec.
//!
//! A worker cannot send application data before its TLS session exists, so
//! its encrypted credential rides inside the ClientHello as a list of
//! offered ALPN protocol identifiers:
//!
//! ```text
//! v1workerauth-001<base64 fragment>
//! v1workerauth-002<base64 fragment>
//! ...
//! ```
//!
//! The `v<N>` prefix carries the credential format version and the three
//! digits that follow are the fragment's 1-based sequence number. Fragments
//! are reassembled by sequence number, never by offered order, and all
//! fragments of one credential must share a single version. Version digits
//! must be written without leading zeros, so `v1` and `v01` are never
//! treated as the same marker.

use thiserror::Error;

/// Identifier prefix for the supported credential version.
pub const WORKER_AUTH_PREFIX: &str = "v1workerauth-";

/// Credential format version this codec produces and accepts.
pub const SUPPORTED_VERSION: u32 = 1;

/// Width of the sequence marker following the prefix.
pub const SEQUENCE_LEN: usize = 3;

/// Maximum base64 characters per identifier. ALPN caps an identifier at
/// 255 bytes.
pub const MAX_FRAGMENT_LEN: usize = 200;

/// Largest sequence number a three-digit marker can express.
pub const MAX_FRAGMENTS: usize = 999;

/// Largest base64 credential [`encode`] accepts.
///
/// A ClientHello is a single handshake message of at most 64 KiB and the
/// ALPN list inside it has a 16-bit length. Capping the credential at 250
/// full fragments keeps the extension near 54 KiB and leaves room for the
/// rest of the hello.
pub const MAX_ENCODED_LEN: usize = MAX_FRAGMENT_LEN * 250;

const TAG: &str = "workerauth-";

/// Errors reassembling or encoding a credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlpnError {
    #[error("no matching protocol found")]
    NoMatchingProtocol,

    #[error("mixed credential versions: v{first} and v{other}")]
    MixedVersions { first: u32, other: u32 },

    #[error("unsupported credential version: v{0}")]
    UnsupportedVersion(u32),

    #[error("invalid credential identifier: {0}")]
    InvalidIdentifier(String),

    #[error("duplicate credential fragment {0:03}")]
    DuplicateSequence(u16),

    #[error("missing credential fragment {0:03}")]
    MissingSequence(u16),

    #[error("credential needs {0} fragments, at most {MAX_FRAGMENTS} are allowed")]
    TooManyFragments(usize),

    #[error("credential is {0} bytes, at most {MAX_ENCODED_LEN} fit in a ClientHello")]
    CredentialTooLarge(usize),

    #[error("credential must be non-empty ASCII")]
    InvalidCredential,
}

/// A credential reassembled from offered ALPN identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCredential {
    /// Concatenated base64 fragments in sequence order.
    pub encoded: String,

    /// First matching identifier in offered order. The controller pins the
    /// negotiated protocol to it.
    pub pinned_protocol: String,

    /// Credential format version shared by every fragment.
    pub version: u32,
}

struct Fragment<'a> {
    version: u32,
    sequence: u16,
    data: &'a str,
}

/// Reassemble the credential carried in `protos`.
///
/// Identifiers that do not look like credential fragments are ignored.
pub fn assemble<S: AsRef<str>>(protos: &[S]) -> Result<AssembledCredential, AlpnError> {
    let mut pinned_protocol: Option<&str> = None;
    let mut fragments: Vec<Fragment<'_>> = Vec::new();

    for proto in protos {
        let proto = proto.as_ref();
        let Some(fragment) = parse_identifier(proto) else {
            continue;
        };
        fragments.push(fragment?);
        if pinned_protocol.is_none() {
            pinned_protocol = Some(proto);
        }
    }

    let (Some(pinned_protocol), Some(first)) = (pinned_protocol, fragments.first()) else {
        return Err(AlpnError::NoMatchingProtocol);
    };

    let version = first.version;
    if let Some(other) = fragments.iter().find(|f| f.version != version) {
        return Err(AlpnError::MixedVersions {
            first: version,
            other: other.version,
        });
    }
    if version != SUPPORTED_VERSION {
        return Err(AlpnError::UnsupportedVersion(version));
    }

    if fragments.len() > MAX_FRAGMENTS {
        return Err(AlpnError::TooManyFragments(fragments.len()));
    }

    fragments.sort_by_key(|f| f.sequence);
    for (expected, fragment) in (1u16..).zip(&fragments) {
        if fragment.sequence < expected {
            return Err(AlpnError::DuplicateSequence(fragment.sequence));
        }
        if fragment.sequence > expected {
            return Err(AlpnError::MissingSequence(expected));
        }
    }

    let encoded: String = fragments.iter().map(|f| f.data).collect();

    Ok(AssembledCredential {
        encoded,
        pinned_protocol: pinned_protocol.to_string(),
        version,
    })
}

/// Split a base64 credential into ALPN identifiers, numbered from `001`.
pub fn encode(encoded: &str) -> Result<Vec<String>, AlpnError> {
    if encoded.is_empty() || !encoded.is_ascii() {
        return Err(AlpnError::InvalidCredential);
    }

    if encoded.len() > MAX_ENCODED_LEN {
        return Err(AlpnError::CredentialTooLarge(encoded.len()));
    }

    let protos = encoded
        .as_bytes()
        .chunks(MAX_FRAGMENT_LEN)
        .enumerate()
        .map(|(index, chunk)| {
            // ASCII input, so every chunk boundary is a char boundary
            let data = String::from_utf8_lossy(chunk);
            format!("{WORKER_AUTH_PREFIX}{:03}{data}", index + 1)
        })
        .collect();

    Ok(protos)
}

/// Parse one identifier. Returns `None` if it is not a credential fragment.
fn parse_identifier(proto: &str) -> Option<Result<Fragment<'_>, AlpnError>> {
    let after_v = proto.strip_prefix('v')?;
    let digits_end = after_v
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_v.len());
    if digits_end == 0 {
        return None;
    }
    let (version_digits, rest) = after_v.split_at(digits_end);
    let body = rest.strip_prefix(TAG)?;

    Some(parse_body(proto, version_digits, body))
}

fn parse_body<'a>(
    proto: &'a str,
    version_digits: &str,
    body: &'a str,
) -> Result<Fragment<'a>, AlpnError> {
    let invalid = || AlpnError::InvalidIdentifier(proto.to_string());

    if version_digits.len() > 1 && version_digits.starts_with('0') {
        return Err(invalid());
    }
    let version: u32 = version_digits.parse().map_err(|_| invalid())?;

    let marker = body.as_bytes().get(..SEQUENCE_LEN).ok_or_else(invalid)?;
    if !marker.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let sequence = marker
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));
    if sequence == 0 {
        return Err(invalid());
    }

    let data = &body[SEQUENCE_LEN..];
    if data.is_empty() {
        return Err(invalid());
    }

    Ok(Fragment {
        version,
        sequence,
        data,
    })
}
