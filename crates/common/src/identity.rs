//! Participant identity hashing.
//!
//! Anonymous participants are keyed by a salted one-way digest of their
//! network origin. Hashes produced under different salts live in different
//! identity spaces and are never compared with each other.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Sentinel substituted when a request carries no usable address.
///
/// All such requests collapse into one shared bucket and share its caps.
pub const UNKNOWN_ADDRESS: &str = "unknown";

type HmacSha256 = Hmac<Sha256>;

/// Pseudonymous participant key. Never holds a raw address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantHash(String);

impl ParticipantHash {
    /// Wrap an already-computed hash, e.g. one loaded from storage.
    #[must_use]
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Borrow the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the hex digest.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ParticipantHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns a raw participant origin into a stable pseudonymous key.
pub trait ParticipantIdentifier: Send + Sync {
    /// Identify a participant. `None` or blank input maps to [`UNKNOWN_ADDRESS`].
    fn identify(&self, raw: Option<&str>) -> ParticipantHash;
}

/// HMAC-SHA-256 of the address keyed by a deployment salt.
#[derive(Clone)]
pub struct SaltedAddressHasher {
    salt: Vec<u8>,
}

impl SaltedAddressHasher {
    /// Create a hasher for the given salt.
    #[must_use]
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.as_bytes().to_vec(),
        }
    }

    /// Hash an address under this salt.
    #[must_use]
    pub fn hash(&self, raw_address: &str) -> ParticipantHash {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.salt) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        mac.update(raw_address.as_bytes());
        ParticipantHash(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for SaltedAddressHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltedAddressHasher")
            .field("salt", &"<redacted>")
            .finish()
    }
}

impl ParticipantIdentifier for SaltedAddressHasher {
    fn identify(&self, raw: Option<&str>) -> ParticipantHash {
        let address = raw
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_ADDRESS);
        self.hash(address)
    }
}
