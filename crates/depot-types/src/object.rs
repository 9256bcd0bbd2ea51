use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Length of a SHA-1 digest in bytes.
pub const HASH_LEN: usize = 20;

/// Length of the hex rendering of an [`ObjectHash`].
pub const HASH_HEX_LEN: usize = HASH_LEN * 2;

/// Content-addressed identifier for a stored object.
///
/// An `ObjectHash` is the SHA-1 digest of an object's content (or, for trees,
/// of its children's hashes). It always renders as 40 lowercase hex
/// characters, which is also the form used in on-disk file names and on the
/// wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash([u8; HASH_LEN]);

impl ObjectHash {
    /// Hash raw bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    /// Wrap a pre-computed digest.
    pub fn from_raw(raw: [u8; HASH_LEN]) -> Self {
        Self(raw)
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != HASH_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_HEX_LEN,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let mut raw = [0u8; HASH_LEN];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.short_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ObjectHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ObjectHash> for String {
    fn from(hash: ObjectHash) -> Self {
        hash.to_hex()
    }
}
