//! Content-derived job identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, VoucherError};

/// Fixed-length hex digest of a serialized payload.
///
/// Doubles as the cache key and the public job id handed back by
/// `POST /vouchers`. Structurally identical payloads always produce the same
/// key, so resubmitting a batch is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashKey(String);

impl HashKey {
    /// Number of hex characters in a key (128 bits of SHA-256).
    pub const LEN: usize = 32;

    /// Hash the canonical JSON serialization of `payload`.
    ///
    /// Field order follows the `Serialize` impl, so two values that differ
    /// only in map iteration order are not guaranteed to collide. Callers hash
    /// `Vec`s of derive-serialized structs, which are stable.
    pub fn from_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Hash already-serialized bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = hex::encode(digest);
        hex.truncate(Self::LEN);
        Self(hex)
    }

    /// Parse a key received from a caller.
    ///
    /// Accepts exactly [`HashKey::LEN`] lowercase hex characters.
    pub fn parse(raw: &str) -> Result<Self> {
        let well_formed = raw.len() == Self::LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(VoucherError::InvalidKey(raw.chars().take(64).collect()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HashKey {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HashKey {
    type Error = VoucherError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HashKey> for String {
    fn from(key: HashKey) -> Self {
        key.0
    }
}
