//! Content digests.
//!
//! A [`Digest`] is the 32-byte sha256 hash identifying an image independently
//! of its mutable tags. The canonical text form is `sha256:<64 lowercase hex>`;
//! nothing else parses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SealError};

/// Algorithm prefix of the canonical text form.
pub const SHA256_PREFIX: &str = "sha256:";

/// Length of a sha256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A sha256 content digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Parse the canonical `sha256:<64 lowercase hex>` form.
    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(SHA256_PREFIX)
            .ok_or_else(|| SealError::InvalidDigest(format!("'{}' lacks the sha256: prefix", s)))?;

        if hex_part.len() != DIGEST_LEN * 2 {
            return Err(SealError::InvalidDigest(format!(
                "'{}' has {} hex characters, expected {}",
                s,
                hex_part.len(),
                DIGEST_LEN * 2
            )));
        }
        if !hex_part
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(SealError::InvalidDigest(format!(
                "'{}' is not lowercase hexadecimal",
                s
            )));
        }

        let bytes = hex::decode(hex_part).map_err(|e| SealError::InvalidDigest(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build a digest from raw bytes. Anything but exactly 32 bytes is rejected;
    /// input is never truncated or padded.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| {
            SealError::InvalidDigest(format!(
                "digest must be exactly {} bytes, got {}",
                DIGEST_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Decode a `sha256:<hex>` string of any hex length and then enforce the
    /// byte length. Used where upstream data may carry malformed digests and
    /// the length violation must be reported as such.
    pub fn decode_lenient(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix(SHA256_PREFIX).unwrap_or(s);
        let bytes = hex::decode(hex_part)
            .map_err(|e| SealError::InvalidDigest(format!("'{}': {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex without the algorithm prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SHA256_PREFIX, self.hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}
