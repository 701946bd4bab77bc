//! Content-addressed configuration hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HASH_LEN: usize = 32;

/// SHA-256 digest of the exact bytes of a configuration document.
///
/// Renders as 64 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use fleetplane::pipeline::domain::ConfigHash;
///
/// let hash = ConfigHash::of(b"receivers: {}\n");
/// let parsed: ConfigHash = hash.to_string().parse().expect("valid hex");
/// assert_eq!(hash, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigHash([u8; HASH_LEN]);

impl ConfigHash {
    /// Hashes the given bytes verbatim.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Wraps an existing digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Interprets a hash reported by an agent.
    ///
    /// Agents send either the 32 raw digest bytes or the 64-character hex
    /// rendering encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ParseConfigHashError`] when the value is neither form.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ParseConfigHashError> {
        if let Ok(raw) = <[u8; HASH_LEN]>::try_from(bytes) {
            return Ok(Self(raw));
        }
        decode_hex(bytes).map(Self)
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ConfigHash {
    type Err = ParseConfigHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex(s.as_bytes()).map(Self)
    }
}

impl TryFrom<String> for ConfigHash {
    type Error = ParseConfigHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfigHash> for String {
    fn from(hash: ConfigHash) -> Self {
        hash.to_string()
    }
}

/// A reported or persisted hash is not a SHA-256 digest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration hash: {0}")]
pub struct ParseConfigHashError(pub String);

fn decode_hex(text: &[u8]) -> Result<[u8; HASH_LEN], ParseConfigHashError> {
    let invalid = || ParseConfigHashError(String::from_utf8_lossy(text).into_owned());
    if text.len() != HASH_LEN * 2 {
        return Err(invalid());
    }
    let mut out = [0_u8; HASH_LEN];
    for (slot, pair) in out.iter_mut().zip(text.chunks_exact(2)) {
        let [high, low] = pair else {
            return Err(invalid());
        };
        let (Some(hi), Some(lo)) = (nibble(*high), nibble(*low)) else {
            return Err(invalid());
        };
        *slot = (hi << 4) | lo;
    }
    Ok(out)
}

const fn nibble(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
